//! Reference-counted byte buffer with copy-on-write semantics.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, MAX_SEQ_LEN, read_exact};
use std::ops::Deref;
use std::sync::Arc;

/// A reference-counted, effectively immutable byte buffer.
///
/// Transaction payloads and code blobs are shared between blocks, tries and
/// caches; wrapping `Arc<Vec<u8>>` makes those clones a pointer copy.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    /// Creates a buffer from anything convertible to `Vec<u8>`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Copies the contents into a fresh `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl Encode for Bytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_slice());
    }
}

impl Decode for Bytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_SEQ_LEN {
            return Err(DecodeError::LengthOverflow);
        }
        let bytes = read_exact(input, len)?;
        Ok(Bytes::new(bytes))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<&[u8; N]> for Bytes {
    fn from(arr: &[u8; N]) -> Self {
        Self::new(arr.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_storage() {
        let a = Bytes::new(b"shared".as_slice());
        let b = a.clone();
        assert_eq!(a.as_slice().as_ptr(), b.as_slice().as_ptr());
    }

    #[test]
    fn encode_is_length_prefixed() {
        let bytes = Bytes::new(b"abc".as_slice()).to_bytes();
        assert_eq!(&bytes[..8], &3u64.to_le_bytes());
        assert_eq!(&bytes[8..], b"abc");
    }

    #[test]
    fn roundtrip() {
        let original = Bytes::new((0u8..=255).collect::<Vec<u8>>());
        let decoded = Bytes::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn empty_roundtrip() {
        let empty = Bytes::default();
        assert!(empty.is_empty());
        assert_eq!(Bytes::from_bytes(&empty.to_bytes()).unwrap(), empty);
    }

    #[test]
    fn truncated_input_fails() {
        let mut bytes = 10u64.to_bytes();
        bytes.extend_from_slice(b"short");
        assert_eq!(Bytes::from_bytes(&bytes), Err(DecodeError::UnexpectedEof));
    }
}
