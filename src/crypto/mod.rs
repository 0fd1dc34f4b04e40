//! Cryptographic primitives: key pairs, signing, and signer recovery.

pub mod key_pair;
