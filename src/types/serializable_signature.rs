//! Wire form of recoverable secp256k1 signatures.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_exact};
use k256::ecdsa::{RecoveryId, Signature};

/// Serialized signature length: 64-byte `r ‖ s` plus one recovery byte.
pub const SIGNATURE_LEN: usize = 65;

/// Recoverable ECDSA signature with a fixed 65-byte canonical encoding.
///
/// The recovery byte lets verifiers reconstruct the signer's public key from
/// the signed digest alone, so transactions carry no explicit sender field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl SerializableSignature {
    pub fn new(signature: Signature, recovery_id: RecoveryId) -> Self {
        Self {
            signature,
            recovery_id,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn recovery_id(&self) -> RecoveryId {
        self.recovery_id
    }

    /// Returns the canonical `r ‖ s ‖ v` byte form.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&self.signature.to_bytes());
        out[64] = self.recovery_id.to_byte();
        out
    }

    /// Parses the canonical byte form, rejecting invalid scalars or recovery
    /// bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return None;
        }
        let signature = Signature::from_slice(&bytes[..64]).ok()?;
        let recovery_id = RecoveryId::from_byte(bytes[64])?;
        Some(Self {
            signature,
            recovery_id,
        })
    }
}

impl Encode for SerializableSignature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bytes());
    }
}

impl Decode for SerializableSignature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_exact(input, SIGNATURE_LEN)?;
        SerializableSignature::from_slice(bytes).ok_or(DecodeError::InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::hash::Hash;

    #[test]
    fn roundtrip() {
        let key = PrivateKey::new();
        let sig = key.sign_hash(&Hash::digest(b"payload"));

        let bytes = Encode::to_bytes(&sig);
        assert_eq!(bytes.len(), SIGNATURE_LEN);
        assert_eq!(SerializableSignature::from_bytes(&bytes).unwrap(), sig);
    }

    #[test]
    fn rejects_bad_length() {
        assert!(SerializableSignature::from_slice(&[0u8; 64]).is_none());
        assert!(SerializableSignature::from_slice(&[0u8; 66]).is_none());
    }

    #[test]
    fn rejects_zero_scalars() {
        // r = s = 0 is not a valid signature
        assert!(SerializableSignature::from_slice(&[0u8; SIGNATURE_LEN]).is_none());
    }

    #[test]
    fn rejects_invalid_recovery_byte() {
        let key = PrivateKey::new();
        let mut bytes = key.sign_hash(&Hash::digest(b"x")).to_bytes();
        bytes[64] = 0xFF;
        assert!(SerializableSignature::from_slice(&bytes).is_none());
    }
}
