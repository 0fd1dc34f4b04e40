//! Core ledger data structures.
//!
//! - `Account`: canonical account record committed into the state trie
//! - `Block` / `Header`: immutable chain step with content-derived ID
//! - `Chain`: append-only block store with head selection
//! - `Transaction`: multi-clause signed instruction bundle with work
//!   scoring

pub mod account;
pub mod block;
pub mod chain;
pub mod transaction;
