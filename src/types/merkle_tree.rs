//! Merkle root computation for block transaction lists.
//!
//! Behavior:
//! - an empty list yields the all-zero hash
//! - odd layers duplicate the last node before hashing the pair
//! - reduction is performed in place to avoid per-level allocations

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const MERKLE_NODE_DOMAIN: &[u8] = b"MERKLE_NODE";

/// Builds deterministic Merkle roots from hashes or transactions.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        Hash::sha3()
            .chain(MERKLE_NODE_DOMAIN)
            .chain(left.as_slice())
            .chain(right.as_slice())
            .finalize()
    }

    /// Reduces leaf hashes to a root, duplicating the last node of odd
    /// layers. Returns the zero hash for an empty input.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return Hash::zero();
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            let mut read = 0;
            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len { nodes[read + 1] } else { left };
                nodes[write] = Self::hash_pair(left, right);
                write += 1;
                read += 2;
            }
            len = write;
        }

        nodes[0]
    }

    /// Computes the transaction root of a block body from transaction ids.
    pub fn from_transactions(txs: &[Transaction]) -> Hash {
        Self::from_raw(txs.iter().map(|tx| tx.id()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{Builder, Clause};
    use crate::crypto::key_pair::PrivateKey;

    fn leaf(data: &[u8]) -> Hash {
        Hash::digest(data)
    }

    #[test]
    fn empty_returns_zero_hash() {
        assert_eq!(MerkleTree::from_raw(Vec::new()), Hash::zero());
        assert_eq!(MerkleTree::from_transactions(&[]), Hash::zero());
    }

    #[test]
    fn single_leaf_returns_leaf() {
        let l = leaf(b"leaf");
        assert_eq!(MerkleTree::from_raw(vec![l]), l);
    }

    #[test]
    fn even_layer_matches_manual_reduction() {
        let (a, b, c, d) = (leaf(b"a"), leaf(b"b"), leaf(b"c"), leaf(b"d"));
        let expected = MerkleTree::hash_pair(
            MerkleTree::hash_pair(a, b),
            MerkleTree::hash_pair(c, d),
        );
        assert_eq!(MerkleTree::from_raw(vec![a, b, c, d]), expected);
    }

    #[test]
    fn odd_layer_duplicates_last_node() {
        let (a, b, c) = (leaf(b"a"), leaf(b"b"), leaf(b"c"));
        let expected = MerkleTree::hash_pair(
            MerkleTree::hash_pair(a, b),
            MerkleTree::hash_pair(c, c),
        );
        assert_eq!(MerkleTree::from_raw(vec![a, b, c]), expected);
    }

    #[test]
    fn from_transactions_uses_transaction_ids() {
        let key = PrivateKey::from_bytes(&[1u8; 32]).expect("valid key");
        let txs = vec![
            Builder::new()
                .nonce(1)
                .gas(21_000)
                .clause(Clause::create())
                .build()
                .sign(&key),
            Builder::new()
                .nonce(2)
                .gas(21_000)
                .clause(Clause::create())
                .build()
                .sign(&key),
        ];

        let ids: Vec<Hash> = txs.iter().map(|tx| tx.id()).collect();
        assert_eq!(MerkleTree::from_transactions(&txs), MerkleTree::from_raw(ids));
    }
}
