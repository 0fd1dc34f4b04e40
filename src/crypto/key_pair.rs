//! Recoverable ECDSA key pairs on secp256k1.

use crate::types::address::{ADDRESS_LEN, Address};
use crate::types::hash::Hash;
use crate::types::serializable_signature::SerializableSignature;
use k256::ecdsa::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};

/// Private key for signing transactions and blocks.
///
/// Generated from OS entropy; never serialized by this crate.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key with its derived account address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
    address: Address,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes are not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_slice(bytes).ok().map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(*self.key.verifying_key())
    }

    /// Shorthand for the address of the derived public key.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Signs a 32-byte digest, producing a recoverable signature.
    pub fn sign_hash(&self, hash: &Hash) -> SerializableSignature {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .expect("signing a 32-byte digest cannot fail");
        SerializableSignature::new(signature, recovery_id)
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKey {
    /// Wraps a verifying key and computes its address.
    ///
    /// Address derivation: SHA3-256(compressed SEC1 bytes)[12..32].
    pub(crate) fn from_verifying_key(key: VerifyingKey) -> Self {
        let address = address_of(&key);
        PublicKey { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(key.to_encoded_point(true).as_bytes());
    let full: [u8; 32] = hasher.finalize().into();

    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&full[12..]);
    Address(addr)
}

/// Recovers the signer address of `signature` over the given digest.
///
/// Returns `None` when no public key can be reconstructed, which callers
/// surface as an invalid-signature failure.
pub fn recover_signer(hash: &Hash, signature: &SerializableSignature) -> Option<Address> {
    VerifyingKey::recover_from_prehash(
        hash.as_slice(),
        signature.signature(),
        signature.recovery_id(),
    )
    .ok()
    .map(|key| address_of(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover() {
        let key = PrivateKey::new();
        let digest = Hash::digest(b"message");
        let sig = key.sign_hash(&digest);

        assert_eq!(recover_signer(&digest, &sig), Some(key.address()));
    }

    #[test]
    fn recovery_fails_for_other_digest() {
        let key = PrivateKey::new();
        let sig = key.sign_hash(&Hash::digest(b"message"));

        let recovered = recover_signer(&Hash::digest(b"other"), &sig);
        // recovery over a different digest yields a different key, if any
        assert_ne!(recovered, Some(key.address()));
    }

    #[test]
    fn from_bytes_is_deterministic() {
        let a = PrivateKey::from_bytes(&[3u8; 32]).expect("valid scalar");
        let b = PrivateKey::from_bytes(&[3u8; 32]).expect("valid scalar");
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn from_bytes_rejects_invalid_scalar() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_none());
        assert!(PrivateKey::from_bytes(&[0xFFu8; 32]).is_none());
    }

    #[test]
    fn distinct_keys_have_distinct_addresses() {
        assert_ne!(PrivateKey::new().address(), PrivateKey::new().address());
    }
}
