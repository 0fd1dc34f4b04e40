//! Content-addressed, versioned trie store.
//!
//! A binary PATRICIA trie over the SHA3-256 image of each user key. Nodes
//! are immutable records persisted under their own content hash, so a root
//! hash pins one exact key→value mapping forever: committing staged writes
//! creates new nodes and a new root while every previously committed root
//! stays readable.
//!
//! The trie shape is a pure function of the final key set — branch nodes
//! split at the first divergent bit of their subtrees' paths — which makes
//! the committed root independent of the order writes were staged.

use crate::storage::kv::{KvError, KvStore, NS_NODE, WriteBatch, ns_key};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{HASH_LEN, Hash};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Root hash of the empty trie.
pub const EMPTY_ROOT: Hash = Hash::zero();

const NODE_DOMAIN: &[u8] = b"TRIE_NODE";

#[derive(Debug, Error)]
pub enum TrieError {
    /// The requested root was never committed to this store.
    #[error("root {0} not found")]
    RootNotFound(Hash),
    /// A node referenced by a committed root is missing or undecodable.
    ///
    /// Distinct from `RootNotFound`: this is store corruption, not a caller
    /// asking for something absent.
    #[error("trie node {0} missing or undecodable")]
    CorruptNode(Hash),
    #[error(transparent)]
    Store(#[from] KvError),
}

/// One immutable trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    /// Terminal node holding the full 256-bit path and the value.
    Leaf { path: Hash, value: Vec<u8> },
    /// Interior node; `bit` is the first position where the paths of the
    /// two subtrees diverge. Bit indices strictly increase root to leaf.
    Branch { bit: u16, left: Hash, right: Hash },
}

impl Node {
    /// Content address of this node.
    fn id(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(NODE_DOMAIN);
        self.encode(&mut h);
        h.finalize()
    }
}

impl Encode for Node {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            Node::Leaf { path, value } => {
                0u8.encode(out);
                path.encode(out);
                value.encode(out);
            }
            Node::Branch { bit, left, right } => {
                1u8.encode(out);
                bit.encode(out);
                left.encode(out);
                right.encode(out);
            }
        }
    }
}

impl Decode for Node {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(Node::Leaf {
                path: Hash::decode(input)?,
                value: Vec::<u8>::decode(input)?,
            }),
            1 => Ok(Node::Branch {
                bit: u16::decode(input)?,
                left: Hash::decode(input)?,
                right: Hash::decode(input)?,
            }),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Uniform 256-bit trie path for a user key.
fn path_of(key: &[u8]) -> Hash {
    Hash::digest(key)
}

/// Bit `i` of a path, most significant bit first.
fn bit_at(path: &Hash, i: u16) -> u8 {
    let byte = path.0[(i / 8) as usize];
    (byte >> (7 - i % 8)) & 1
}

/// First bit position where two distinct paths diverge.
fn first_diff_bit(a: &Hash, b: &Hash) -> u16 {
    for i in 0..HASH_LEN {
        let x = a.0[i] ^ b.0[i];
        if x != 0 {
            return (i as u16) * 8 + x.leading_zeros() as u16;
        }
    }
    unreachable!("paths are distinct")
}

/// Read-only view over one committed root.
///
/// Cheap to copy and safe to share across threads; the underlying nodes
/// never change.
pub struct Trie<'a, S: KvStore> {
    store: &'a S,
    root: Hash,
}

impl<'a, S: KvStore> Clone for Trie<'a, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S: KvStore> Copy for Trie<'a, S> {}

impl<'a, S: KvStore> Trie<'a, S> {
    /// Attaches to a committed root.
    ///
    /// Fails with [`TrieError::RootNotFound`] unless `root` is the empty
    /// sentinel or a node previously written to `store`.
    pub fn open(store: &'a S, root: Hash) -> Result<Self, TrieError> {
        if root != EMPTY_ROOT && store.get(&ns_key(NS_NODE, &root))?.is_none() {
            return Err(TrieError::RootNotFound(root));
        }
        Ok(Self { store, root })
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    /// Looks up the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        self.get_path(&path_of(key))
    }

    fn get_path(&self, path: &Hash) -> Result<Option<Vec<u8>>, TrieError> {
        let mut id = self.root;
        if id == EMPTY_ROOT {
            return Ok(None);
        }
        loop {
            match self.load(id)? {
                Node::Leaf { path: p, value } => {
                    return Ok(if p == *path { Some(value) } else { None });
                }
                Node::Branch { bit, left, right } => {
                    id = if bit_at(path, bit) == 0 { left } else { right };
                }
            }
        }
    }

    fn load(&self, id: Hash) -> Result<Node, TrieError> {
        let raw = self
            .store
            .get(&ns_key(NS_NODE, &id))?
            .ok_or(TrieError::CorruptNode(id))?;
        Node::from_bytes(&raw).map_err(|_| TrieError::CorruptNode(id))
    }

    /// Starts a staged write set against this root.
    pub fn stage(self) -> StagedTrie<'a, S> {
        StagedTrie {
            base: self,
            pending: BTreeMap::new(),
        }
    }
}

/// Uncommitted writes layered over a base root.
///
/// Staged writes are visible to reads on this view only; the base root and
/// every other view are untouched until [`StagedTrie::commit`]. Last write
/// per key wins. Single-writer: callers serialize access to one staged view.
pub struct StagedTrie<'a, S: KvStore> {
    base: Trie<'a, S>,
    /// Pending writes keyed by trie path; `None` is a tombstone.
    pending: BTreeMap<Hash, Option<Vec<u8>>>,
}

impl<'a, S: KvStore> StagedTrie<'a, S> {
    /// Stages a value for `key`.
    pub fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.pending.insert(path_of(key), Some(value));
    }

    /// Stages a tombstone for `key`. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) {
        self.pending.insert(path_of(key), None);
    }

    /// Reads through the pending overlay, then the base root.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let path = path_of(key);
        match self.pending.get(&path) {
            Some(write) => Ok(write.clone()),
            None => self.base.get_path(&path),
        }
    }

    /// Computes and persists the new trie, returning the new root and a
    /// view over it.
    ///
    /// All new nodes land in one atomic batch: either the new root becomes
    /// durably readable in full, or the store is left untouched.
    pub fn commit(self) -> Result<(Hash, Trie<'a, S>), TrieError> {
        let store = self.base.store;
        let (root, batch) = self.build()?;
        if !batch.is_empty() {
            store.write(batch)?;
        }
        Ok((root, Trie { store, root }))
    }

    /// Computes the new root and the node batch without writing.
    ///
    /// Used by the state engine to fold account and storage tries into one
    /// atomic batch.
    pub(crate) fn build(&self) -> Result<(Hash, WriteBatch), TrieError> {
        let mut builder = NodeBuilder {
            base: self.base,
            fresh: HashMap::new(),
        };

        let mut root = self.base.root;
        for (path, write) in &self.pending {
            root = match write {
                Some(value) => builder.insert(root, *path, value.clone())?,
                None => builder.remove(root, path)?,
            };
        }

        let mut batch = WriteBatch::new();
        builder.sweep(root, &mut batch);
        Ok((root, batch))
    }
}

/// Applies staged writes, accumulating freshly created nodes in memory
/// until the final reachable set is swept into a write batch.
struct NodeBuilder<'a, S: KvStore> {
    base: Trie<'a, S>,
    fresh: HashMap<Hash, Node>,
}

impl<'a, S: KvStore> NodeBuilder<'a, S> {
    fn load(&self, id: Hash) -> Result<Node, TrieError> {
        if let Some(node) = self.fresh.get(&id) {
            return Ok(node.clone());
        }
        self.base.load(id)
    }

    fn save(&mut self, node: Node) -> Hash {
        let id = node.id();
        self.fresh.insert(id, node);
        id
    }

    fn insert(&mut self, root: Hash, path: Hash, value: Vec<u8>) -> Result<Hash, TrieError> {
        if root == EMPTY_ROOT {
            return Ok(self.save(Node::Leaf { path, value }));
        }
        let best = self.best_match(root, &path)?;
        if best == path {
            return self.replace(root, path, value);
        }
        let diff = first_diff_bit(&best, &path);
        self.graft(root, path, value, diff)
    }

    /// Follows `path` bits to the nearest leaf, returning its path.
    fn best_match(&self, mut id: Hash, path: &Hash) -> Result<Hash, TrieError> {
        loop {
            match self.load(id)? {
                Node::Leaf { path: p, .. } => return Ok(p),
                Node::Branch { bit, left, right } => {
                    id = if bit_at(path, bit) == 0 { left } else { right };
                }
            }
        }
    }

    /// Rewrites the leaf for an existing path, rebuilding the spine above.
    fn replace(&mut self, id: Hash, path: Hash, value: Vec<u8>) -> Result<Hash, TrieError> {
        match self.load(id)? {
            Node::Leaf { .. } => Ok(self.save(Node::Leaf { path, value })),
            Node::Branch { bit, left, right } => {
                if bit_at(&path, bit) == 0 {
                    let left = self.replace(left, path, value)?;
                    Ok(self.save(Node::Branch { bit, left, right }))
                } else {
                    let right = self.replace(right, path, value)?;
                    Ok(self.save(Node::Branch { bit, left, right }))
                }
            }
        }
    }

    /// Splices a new leaf in at divergence bit `diff`, descending past any
    /// branches that split earlier.
    fn graft(&mut self, id: Hash, path: Hash, value: Vec<u8>, diff: u16) -> Result<Hash, TrieError> {
        match self.load(id)? {
            Node::Branch { bit, left, right } if bit < diff => {
                if bit_at(&path, bit) == 0 {
                    let left = self.graft(left, path, value, diff)?;
                    Ok(self.save(Node::Branch { bit, left, right }))
                } else {
                    let right = self.graft(right, path, value, diff)?;
                    Ok(self.save(Node::Branch { bit, left, right }))
                }
            }
            _ => {
                let side = bit_at(&path, diff);
                let leaf = self.save(Node::Leaf { path, value });
                let node = if side == 0 {
                    Node::Branch {
                        bit: diff,
                        left: leaf,
                        right: id,
                    }
                } else {
                    Node::Branch {
                        bit: diff,
                        left: id,
                        right: leaf,
                    }
                };
                Ok(self.save(node))
            }
        }
    }

    fn remove(&mut self, root: Hash, path: &Hash) -> Result<Hash, TrieError> {
        if root == EMPTY_ROOT {
            return Ok(EMPTY_ROOT);
        }
        self.remove_inner(root, path)
    }

    /// Removes the leaf for `path`, collapsing single-child branches.
    /// Returns the original id unchanged when the path is absent.
    fn remove_inner(&mut self, id: Hash, path: &Hash) -> Result<Hash, TrieError> {
        match self.load(id)? {
            Node::Leaf { path: p, .. } => Ok(if p == *path { EMPTY_ROOT } else { id }),
            Node::Branch { bit, left, right } => {
                if bit_at(path, bit) == 0 {
                    let new_left = self.remove_inner(left, path)?;
                    if new_left == EMPTY_ROOT {
                        return Ok(right);
                    }
                    if new_left == left {
                        return Ok(id);
                    }
                    Ok(self.save(Node::Branch {
                        bit,
                        left: new_left,
                        right,
                    }))
                } else {
                    let new_right = self.remove_inner(right, path)?;
                    if new_right == EMPTY_ROOT {
                        return Ok(left);
                    }
                    if new_right == right {
                        return Ok(id);
                    }
                    Ok(self.save(Node::Branch {
                        bit,
                        left,
                        right: new_right,
                    }))
                }
            }
        }
    }

    /// Collects the fresh nodes reachable from `root` into `batch`,
    /// skipping intermediate nodes orphaned by later writes in the same
    /// staged set.
    fn sweep(&self, root: Hash, batch: &mut WriteBatch) {
        let Some(node) = self.fresh.get(&root) else {
            return;
        };
        if let Node::Branch { left, right, .. } = node {
            self.sweep(*left, batch);
            self.sweep(*right, batch);
        }
        batch.put(ns_key(NS_NODE, &root), node.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;

    fn commit_pairs<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        store: &MemoryStore,
        base: Hash,
        pairs: &[(K, V)],
    ) -> Hash {
        let mut staged = Trie::open(store, base).unwrap().stage();
        for (k, v) in pairs {
            staged.put(k.as_ref(), v.as_ref().to_vec());
        }
        let (root, _) = staged.commit().unwrap();
        root
    }

    #[test]
    fn empty_root_reads_nothing() {
        let store = MemoryStore::new();
        let trie = Trie::open(&store, EMPTY_ROOT).unwrap();
        assert!(trie.get(b"anything").unwrap().is_none());
    }

    #[test]
    fn open_unknown_root_fails() {
        let store = MemoryStore::new();
        let result = Trie::open(&store, Hash::digest(b"nonexistent"));
        assert!(matches!(result, Err(TrieError::RootNotFound(_))));
    }

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryStore::new();
        let root = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);

        let trie = Trie::open(&store, root).unwrap();
        assert_eq!(trie.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(trie.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(trie.get(b"c").unwrap(), Some(b"3".to_vec()));
        assert!(trie.get(b"d").unwrap().is_none());
    }

    #[test]
    fn old_root_stays_readable_after_commit() {
        let store = MemoryStore::new();
        let r1 = commit_pairs(&store, EMPTY_ROOT, &[(b"key", b"old")]);
        let r2 = commit_pairs(&store, r1, &[(b"key", b"new")]);
        assert_ne!(r1, r2);

        assert_eq!(
            Trie::open(&store, r1).unwrap().get(b"key").unwrap(),
            Some(b"old".to_vec())
        );
        assert_eq!(
            Trie::open(&store, r2).unwrap().get(b"key").unwrap(),
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn root_is_independent_of_write_order() {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0u8..16)
            .map(|i| (vec![b'k', i], vec![b'v', i]))
            .collect();

        let forward = {
            let store = MemoryStore::new();
            let mut staged = Trie::open(&store, EMPTY_ROOT).unwrap().stage();
            for (k, v) in &pairs {
                staged.put(k, v.clone());
            }
            staged.commit().unwrap().0
        };

        let reverse = {
            let store = MemoryStore::new();
            let mut staged = Trie::open(&store, EMPTY_ROOT).unwrap().stage();
            for (k, v) in pairs.iter().rev() {
                staged.put(k, v.clone());
            }
            staged.commit().unwrap().0
        };

        let incremental = {
            let store = MemoryStore::new();
            let mut root = EMPTY_ROOT;
            for (k, v) in pairs.iter().rev() {
                let mut staged = Trie::open(&store, root).unwrap().stage();
                staged.put(k, v.clone());
                root = staged.commit().unwrap().0;
            }
            root
        };

        assert_eq!(forward, reverse);
        assert_eq!(forward, incremental);
    }

    #[test]
    fn last_staged_write_per_key_wins() {
        let store = MemoryStore::new();
        let mut staged = Trie::open(&store, EMPTY_ROOT).unwrap().stage();
        staged.put(b"key", b"first".to_vec());
        staged.put(b"key", b"second".to_vec());
        let (root, trie) = staged.commit().unwrap();

        assert_eq!(trie.get(b"key").unwrap(), Some(b"second".to_vec()));
        assert_eq!(root, commit_pairs(&MemoryStore::new(), EMPTY_ROOT, &[(b"key", b"second")]));
    }

    #[test]
    fn staged_reads_see_pending_writes_only_here() {
        let store = MemoryStore::new();
        let base_root = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1")]);

        let base = Trie::open(&store, base_root).unwrap();
        let mut staged = base.stage();
        staged.put(b"b", b"2".to_vec());
        staged.delete(b"a");

        assert!(staged.get(b"a").unwrap().is_none());
        assert_eq!(staged.get(b"b").unwrap(), Some(b"2".to_vec()));

        // the base view is unaffected by staging
        assert_eq!(base.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert!(base.get(b"b").unwrap().is_none());
    }

    #[test]
    fn delete_restores_previous_root() {
        let store = MemoryStore::new();
        let r1 = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1")]);
        let r2 = commit_pairs(&store, r1, &[(b"b", b"2")]);

        let mut staged = Trie::open(&store, r2).unwrap().stage();
        staged.delete(b"b");
        let (root, _) = staged.commit().unwrap();
        assert_eq!(root, r1);
    }

    #[test]
    fn deleting_everything_yields_empty_root() {
        let store = MemoryStore::new();
        let root = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1"), (b"b", b"2")]);

        let mut staged = Trie::open(&store, root).unwrap().stage();
        staged.delete(b"a");
        staged.delete(b"b");
        let (root, trie) = staged.commit().unwrap();

        assert_eq!(root, EMPTY_ROOT);
        assert!(trie.get(b"a").unwrap().is_none());
    }

    #[test]
    fn rewriting_identical_value_keeps_root() {
        let store = MemoryStore::new();
        let r1 = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"same"), (b"b", b"keep")]);
        let r2 = commit_pairs(&store, r1, &[(b"a", b"same")]);
        assert_eq!(r1, r2);
    }

    #[test]
    fn deleting_absent_key_keeps_root() {
        let store = MemoryStore::new();
        let r1 = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1")]);

        let mut staged = Trie::open(&store, r1).unwrap().stage();
        staged.delete(b"never-written");
        let (root, _) = staged.commit().unwrap();
        assert_eq!(root, r1);
    }

    #[test]
    fn distinct_content_distinct_roots() {
        let store = MemoryStore::new();
        let r1 = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"1")]);
        let r2 = commit_pairs(&store, EMPTY_ROOT, &[(b"a", b"2")]);
        let r3 = commit_pairs(&store, EMPTY_ROOT, &[(b"b", b"1")]);
        assert_ne!(r1, r2);
        assert_ne!(r1, r3);
        assert_ne!(r2, r3);
    }

    #[test]
    fn many_keys_survive_interleaved_commits() {
        let store = MemoryStore::new();
        let mut root = EMPTY_ROOT;
        for i in 0u16..64 {
            let mut staged = Trie::open(&store, root).unwrap().stage();
            staged.put(&i.to_le_bytes(), vec![i as u8]);
            root = staged.commit().unwrap().0;
        }

        let trie = Trie::open(&store, root).unwrap();
        for i in 0u16..64 {
            assert_eq!(trie.get(&i.to_le_bytes()).unwrap(), Some(vec![i as u8]));
        }
    }
}
