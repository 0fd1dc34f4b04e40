//! Raw byte store collaborator boundary.
//!
//! The trie store and the chain store both persist through this interface.
//! The backend is assumed crash-consistent at batch-write granularity;
//! everything above it achieves atomicity by funnelling related writes into
//! a single [`WriteBatch`].
//!
//! # Persisted layout
//!
//! - trie nodes and code blobs: content hash under the [`NS_NODE`] prefix
//! - blocks: block ID under the [`NS_BLOCK`] prefix
//! - [`KEY_BEST_BLOCK`]: ID of the current best head, for fast restart
//! - [`KEY_BLOCK_SEQ`]: block admission counter backing head tie-breaks

use crate::types::hash::Hash;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Namespace prefix for content-addressed data (trie nodes, code blobs).
pub const NS_NODE: u8 = b'n';
/// Namespace prefix for blocks keyed by ID.
pub const NS_BLOCK: u8 = b'b';
/// Well-known key holding the best-head block ID.
pub const KEY_BEST_BLOCK: &[u8] = b"meta:best-block";
/// Well-known key holding the next block admission sequence number.
pub const KEY_BLOCK_SEQ: &[u8] = b"meta:block-seq";

/// Builds a namespaced key for a content hash.
pub fn ns_key(namespace: u8, hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + hash.as_slice().len());
    key.push(namespace);
    key.extend_from_slice(hash.as_slice());
    key
}

/// Storage-layer failure, fatal to the in-flight operation.
///
/// Never retried here; retry and backoff policy belongs to the caller.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// An ordered set of puts and deletes applied atomically.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    /// Appends all operations of `other`, preserving order.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Raw key/value byte store.
///
/// Implementations must be thread-safe; `write` must apply the whole batch
/// or none of it.
pub trait KvStore: Send + Sync {
    /// Retrieves the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Stores a single key/value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    /// Applies a batch of puts and deletes atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), KvError>;

    /// Returns all pairs whose key starts with `prefix`, in key order.
    fn iterate(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        (**self).put(key, value)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KvError> {
        (**self).write(batch)
    }

    fn iterate(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        (**self).iterate(prefix)
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        (**self).put(key, value)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KvError> {
        (**self).write(batch)
    }

    fn iterate(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        (**self).iterate(prefix)
    }
}

/// In-memory store for development and tests.
///
/// A single `RwLock` over an ordered map: reads run concurrently, batch
/// writes are atomic with respect to every reader.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KvError> {
        self.inner
            .read()
            .map_err(|_| KvError::Unavailable("store lock poisoned".into()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KvError> {
        self.inner
            .write()
            .map_err(|_| KvError::Unavailable("store lock poisoned".into()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.write_guard()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KvError> {
        let mut map = self.write_guard()?;
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iterate(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        Ok(self
            .read()?
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn get_put_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get(b"k").unwrap().is_none());

        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn batch_applies_puts_and_deletes() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"a".to_vec());
        store.write(batch).unwrap();

        assert!(store.get(b"a").unwrap().is_none());
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn iterate_is_prefix_bounded_and_ordered() {
        let store = MemoryStore::new();
        store.put(b"x:2", b"b").unwrap();
        store.put(b"x:1", b"a").unwrap();
        store.put(b"y:1", b"c").unwrap();

        let entries = store.iterate(b"x:").unwrap();
        assert_eq!(
            entries,
            vec![
                (b"x:1".to_vec(), b"a".to_vec()),
                (b"x:2".to_vec(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn ns_key_prefixes_hash() {
        let hash = Hash::digest(b"node");
        let key = ns_key(NS_NODE, &hash);
        assert_eq!(key[0], NS_NODE);
        assert_eq!(&key[1..], hash.as_slice());
    }

    #[test]
    fn concurrent_readers() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"shared", b"value").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&store);
                thread::spawn(move || s.get(b"shared").unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(b"value".to_vec()));
        }
    }
}
