//! Core type definitions for ledger primitives.
//!
//! - `Hash`: fixed-size 32-byte SHA3-256 hashes
//! - `Address`: 20-byte account identifiers
//! - `encoding`: canonical serialization backing every content address
//!
//! All types are tuned for blockchain workloads with minimal allocations.

pub mod address;
pub mod bytes;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
pub mod serializable_signature;
