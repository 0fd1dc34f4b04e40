//! 20-byte account addresses derived from public keys.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_exact};
use std::fmt;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Fixed-size 20-byte address identifying an account.
///
/// Derived from a public key by SHA3-256 hashing and taking the last 20
/// bytes. `Copy` for cheap passing through validation and lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address.
    pub const fn zero() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates an address from a slice, or `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Address> {
        bytes.try_into().ok().map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encode for Address {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for Address {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_exact(input, ADDRESS_LEN)?;
        Ok(Address(bytes.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn roundtrip() {
        let addr = Address([7u8; ADDRESS_LEN]);
        let bytes = addr.to_bytes();
        assert_eq!(bytes.len(), ADDRESS_LEN);
        assert_eq!(Address::from_bytes(&bytes).unwrap(), addr);
    }

    #[test]
    fn from_slice_validates_length() {
        assert!(Address::from_slice(&[1u8; ADDRESS_LEN]).is_some());
        assert!(Address::from_slice(&[1u8; 19]).is_none());
    }

    #[test]
    fn display_is_hex() {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[0] = 0xFE;
        assert!(Address(bytes).to_string().starts_with("fe"));
    }
}
