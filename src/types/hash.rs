//! 32-byte SHA3-256 hash type with zero-allocation operations.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_exact};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::sync::OnceLock;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash used for every content address in the ledger.
///
/// `Copy` on purpose: hashes are passed around constantly during validation
/// and lookups, and a 32-byte stack copy beats reference indirection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// The all-zero hash, used as the empty-root and no-parent sentinel.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a hash from a slice, or `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        bytes.try_into().ok().map(Hash)
    }

    /// Starts an incremental SHA3-256 computation.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hashes a single byte slice.
    pub fn digest(data: &[u8]) -> Hash {
        Hash::sha3().chain(data).finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encode for Hash {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for Hash {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_exact(input, HASH_LEN)?;
        Ok(Hash(bytes.try_into().unwrap()))
    }
}

/// Incremental SHA3-256 builder.
///
/// Implements [`EncodeSink`], so encodable records hash directly without an
/// intermediate buffer.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Feeds data and returns the builder for chaining.
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// Thread-safe cell for a lazily computed identity hash.
///
/// Blocks and transactions are immutable after construction, so their hash
/// is computed once on first access and reused. The cache is ignored by
/// equality and excluded from encoding.
#[derive(Debug, Default)]
pub struct HashCache(OnceLock<Hash>);

impl HashCache {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the cached hash, computing and storing it on first call.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> Hash) -> Hash {
        *self.0.get_or_init(compute)
    }
}

impl Clone for HashCache {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl PartialEq for HashCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for HashCache {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_all_zero_bytes() {
        assert!(Hash::zero().is_zero());
        assert_eq!(Hash::zero().as_slice(), &[0u8; HASH_LEN]);
    }

    #[test]
    fn digest_matches_incremental() {
        let whole = Hash::digest(b"hello world");
        let incremental = Hash::sha3().chain(b"hello ").chain(b"world").finalize();
        assert_eq!(whole, incremental);
        assert!(!whole.is_zero());
    }

    #[test]
    fn from_slice_validates_length() {
        assert!(Hash::from_slice(&[0u8; HASH_LEN]).is_some());
        assert!(Hash::from_slice(&[0u8; 31]).is_none());
        assert!(Hash::from_slice(&[0u8; 33]).is_none());
    }

    #[test]
    fn display_is_lowercase_hex() {
        let mut bytes = [0u8; HASH_LEN];
        bytes[0] = 0xAB;
        bytes[31] = 0x01;
        let text = Hash(bytes).to_string();
        assert_eq!(text.len(), 64);
        assert!(text.starts_with("ab"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let hash = Hash::digest(b"roundtrip");
        let bytes = hash.to_bytes();
        assert_eq!(bytes.len(), HASH_LEN);
        assert_eq!(Hash::from_bytes(&bytes).unwrap(), hash);
    }

    #[test]
    fn cache_computes_once() {
        let cache = HashCache::new();
        let first = cache.get_or_compute(|| Hash::digest(b"a"));
        let second = cache.get_or_compute(|| Hash::digest(b"b"));
        assert_eq!(first, second);
    }
}
