//! Account state engine over the content-addressed trie.
//!
//! One [`State`] is a mutable working view over a committed state root.
//! Reads fall through a dirty-account overlay to the underlying account
//! trie; writes only touch the overlay until [`State::stage`] resolves
//! every dirty account into trie nodes and [`Stage::commit`] persists the
//! whole batch atomically, yielding the new state root.
//!
//! Each account's key/value storage is a nested trie rooted inside the
//! account record, so staging commits storage tries first and folds their
//! nodes into the same batch as the outer account trie.

use crate::core::account::Account;
use crate::storage::kv::{KvError, KvStore, NS_NODE, WriteBatch, ns_key};
use crate::storage::trie::{StagedTrie, Trie, TrieError};
use crate::types::address::Address;
use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error(transparent)]
    Store(#[from] KvError),
    /// A committed record (account or code blob) is missing or undecodable.
    #[error("state record for {0} is corrupt")]
    Corrupt(Address),
}

/// Working copy of one account plus its pending writes.
struct DirtyAccount {
    account: Account,
    /// Code blob staged by `set_code`, not yet persisted.
    code: Option<Bytes>,
    /// Dirty storage slots; the zero hash clears a slot.
    slots: BTreeMap<Hash, Hash>,
}

/// Mutable account state view over one committed root.
pub struct State<'a, S: KvStore> {
    store: &'a S,
    trie: Trie<'a, S>,
    dirty: BTreeMap<Address, DirtyAccount>,
}

impl<'a, S: KvStore> State<'a, S> {
    /// Opens the state at a committed root.
    ///
    /// Fails with `RootNotFound` when the root was never committed and is
    /// not the empty sentinel.
    pub fn new(store: &'a S, root: Hash) -> Result<Self, StateError> {
        Ok(Self {
            store,
            trie: Trie::open(store, root)?,
            dirty: BTreeMap::new(),
        })
    }

    /// The root this view was opened at. Pending writes do not change it.
    pub fn root(&self) -> Hash {
        self.trie.root()
    }

    fn load_account(&self, addr: Address) -> Result<Option<Account>, StateError> {
        match self.trie.get(addr.as_slice())? {
            Some(raw) => Account::from_bytes(&raw)
                .map(Some)
                .map_err(|_| StateError::Corrupt(addr)),
            None => Ok(None),
        }
    }

    /// Effective account record: dirty overlay first, then the trie, then
    /// the zero account.
    fn account_of(&self, addr: Address) -> Result<Account, StateError> {
        if let Some(dirty) = self.dirty.get(&addr) {
            return Ok(dirty.account.clone());
        }
        Ok(self.load_account(addr)?.unwrap_or_default())
    }

    fn entry(&mut self, addr: Address) -> Result<&mut DirtyAccount, StateError> {
        if !self.dirty.contains_key(&addr) {
            let account = self.load_account(addr)?.unwrap_or_default();
            self.dirty.insert(
                addr,
                DirtyAccount {
                    account,
                    code: None,
                    slots: BTreeMap::new(),
                },
            );
        }
        Ok(self.dirty.get_mut(&addr).unwrap())
    }

    /// Balance of `addr`; zero for never-written addresses.
    pub fn get_balance(&self, addr: Address) -> Result<u128, StateError> {
        Ok(self.account_of(addr)?.balance)
    }

    pub fn set_balance(&mut self, addr: Address, balance: u128) -> Result<(), StateError> {
        self.entry(addr)?.account.balance = balance;
        Ok(())
    }

    /// Code of `addr`; empty for accounts without code.
    pub fn get_code(&self, addr: Address) -> Result<Bytes, StateError> {
        if let Some(dirty) = self.dirty.get(&addr) {
            if let Some(code) = &dirty.code {
                return Ok(code.clone());
            }
        }
        let account = self.account_of(addr)?;
        if account.code_hash.is_zero() {
            return Ok(Bytes::default());
        }
        let raw = self
            .store
            .get(&ns_key(NS_NODE, &account.code_hash))?
            .ok_or(StateError::Corrupt(addr))?;
        Ok(Bytes::new(raw))
    }

    /// Sets the code of `addr`, updating its code hash. Empty code clears
    /// the hash.
    pub fn set_code(&mut self, addr: Address, code: impl Into<Bytes>) -> Result<(), StateError> {
        let code = code.into();
        let entry = self.entry(addr)?;
        if code.is_empty() {
            entry.account.code_hash = Hash::zero();
            entry.code = None;
        } else {
            entry.account.code_hash = Hash::digest(&code);
            entry.code = Some(code);
        }
        Ok(())
    }

    /// Storage slot `key` of `addr`; the zero hash for absent slots.
    pub fn get_storage(&self, addr: Address, key: &Hash) -> Result<Hash, StateError> {
        if let Some(dirty) = self.dirty.get(&addr) {
            if let Some(value) = dirty.slots.get(key) {
                return Ok(*value);
            }
        }
        let account = self.account_of(addr)?;
        if account.storage_root.is_zero() {
            return Ok(Hash::zero());
        }
        let storage = Trie::open(self.store, account.storage_root)?;
        match storage.get(key.as_slice())? {
            Some(raw) => Hash::from_slice(&raw).ok_or(StateError::Corrupt(addr)),
            None => Ok(Hash::zero()),
        }
    }

    /// Sets storage slot `key` of `addr`. Writing the zero hash clears the
    /// slot.
    pub fn set_storage(&mut self, addr: Address, key: Hash, value: Hash) -> Result<(), StateError> {
        self.entry(addr)?.slots.insert(key, value);
        Ok(())
    }

    /// Whether `addr` resolves to anything other than the zero account.
    pub fn exists(&self, addr: Address) -> Result<bool, StateError> {
        if let Some(dirty) = self.dirty.get(&addr) {
            return Ok(!dirty.account.is_empty() || !dirty.slots.values().all(Hash::is_zero));
        }
        Ok(self.load_account(addr)?.is_some())
    }

    /// Resolves the pending write set into trie nodes and the resulting
    /// state root.
    ///
    /// Nested storage tries commit first so each account record carries its
    /// final storage root; the outer account trie commits over those
    /// records. Nothing is persisted until [`Stage::commit`].
    pub fn stage(&self) -> Result<Stage<'a, S>, StateError> {
        let mut outer: StagedTrie<'a, S> = self.trie.stage();
        let mut extra = WriteBatch::new();

        for (addr, dirty) in &self.dirty {
            let mut account = dirty.account.clone();

            if !dirty.slots.is_empty() {
                let storage = Trie::open(self.store, account.storage_root)?;
                let mut staged = storage.stage();
                for (key, value) in &dirty.slots {
                    if value.is_zero() {
                        staged.delete(key.as_slice());
                    } else {
                        staged.put(key.as_slice(), value.as_slice().to_vec());
                    }
                }
                let (storage_root, nodes) = staged.build()?;
                account.storage_root = storage_root;
                extra.extend(nodes);
            }

            if let Some(code) = &dirty.code {
                extra.put(ns_key(NS_NODE, &account.code_hash), code.to_vec());
            }

            // an account equal to the zero account is pruned entirely
            if account.is_empty() {
                outer.delete(addr.as_slice());
            } else {
                outer.put(addr.as_slice(), account.to_bytes());
            }
        }

        let (root, mut batch) = outer.build()?;
        batch.extend(extra);
        Ok(Stage {
            store: self.store,
            root,
            batch,
        })
    }
}

/// A resolved write set awaiting persistence.
pub struct Stage<'a, S: KvStore> {
    store: &'a S,
    root: Hash,
    batch: WriteBatch,
}

impl<'a, S: KvStore> Stage<'a, S> {
    /// The state root this stage will commit to.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Persists the staged nodes in one atomic batch and returns the new
    /// state root. On failure the store is left exactly as it was.
    pub fn commit(self) -> Result<Hash, StateError> {
        if !self.batch.is_empty() {
            self.store.write(self.batch)?;
        }
        Ok(self.root)
    }
}
