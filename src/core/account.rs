//! Canonical account record persisted in the state trie.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;

/// Account state as committed into the ledger.
///
/// Code bytes and storage slots live outside the record, addressed by
/// `code_hash` and `storage_root`. The encoding is canonical: identical
/// accounts always produce identical trie leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Spendable balance in the native currency.
    pub balance: u128,
    /// Hash of the account's code, or the zero hash for accounts without
    /// code.
    pub code_hash: Hash,
    /// Root of the account's nested storage trie; zero when storage is
    /// empty.
    pub storage_root: Hash,
}

impl Account {
    pub const EMPTY_CODE_HASH: Hash = Hash::zero();
    pub const EMPTY_STORAGE_ROOT: Hash = Hash::zero();

    /// Creates an account holding only a balance.
    pub fn with_balance(balance: u128) -> Self {
        Self {
            balance,
            code_hash: Self::EMPTY_CODE_HASH,
            storage_root: Self::EMPTY_STORAGE_ROOT,
        }
    }

    /// An account with no balance, no code and no storage is
    /// indistinguishable from one that does not exist, and is pruned from
    /// the trie on commit.
    pub fn is_empty(&self) -> bool {
        self.balance == 0 && self.code_hash.is_zero() && self.storage_root.is_zero()
    }

    /// Returns true if this account carries code.
    pub fn has_code(&self) -> bool {
        !self.code_hash.is_zero()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::with_balance(0)
    }
}

impl Encode for Account {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.balance.encode(out);
        self.code_hash.encode(out);
        self.storage_root.encode(out);
    }
}

impl Decode for Account {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Account {
            balance: u128::decode(input)?,
            code_hash: Hash::decode(input)?,
            storage_root: Hash::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_balance_has_no_code_or_storage() {
        let account = Account::with_balance(1_000_000);
        assert_eq!(account.balance, 1_000_000);
        assert!(!account.has_code());
        assert_eq!(account.storage_root, Hash::zero());
    }

    #[test]
    fn zero_account_is_empty() {
        assert!(Account::default().is_empty());
        assert!(!Account::with_balance(1).is_empty());

        let with_code = Account {
            balance: 0,
            code_hash: Hash::digest(b"code"),
            storage_root: Hash::zero(),
        };
        assert!(!with_code.is_empty());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let account = Account {
            balance: 123_456_789,
            code_hash: Hash::digest(b"code"),
            storage_root: Hash::digest(b"storage"),
        };
        let bytes = account.to_bytes();
        assert_eq!(Account::from_bytes(&bytes).unwrap(), account);
    }

    #[test]
    fn identical_accounts_encode_identically() {
        let a = Account::with_balance(500);
        let b = Account::with_balance(500);
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_ne!(a.to_bytes(), Account::with_balance(501).to_bytes());
    }
}
