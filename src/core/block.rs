//! Block and header structures with the block builder.

use crate::types::address::Address;
use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{Hash, HashCache};
use crate::types::merkle_tree::MerkleTree;
use crate::core::transaction::Transaction;

const BLOCK_ID_DOMAIN: &[u8] = b"BLOCK_ID";

/// Block header: the hashed commitment to one chain step.
///
/// `total_score` accumulates monotonically along every chain, so comparing
/// two heads reduces to comparing two headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// ID of the parent block; the zero hash only for genesis.
    pub parent_id: Hash,
    /// Height in the chain, genesis = 0.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Cumulative chain weight up to and including this block.
    pub total_score: u64,
    /// Merkle root of the body's transaction ids.
    pub tx_root: Hash,
    /// State root after executing this block's transactions.
    pub state_root: Hash,
    /// Address of the block producer.
    pub producer: Address,
    /// Producer signature bytes; opaque to the chain store.
    pub signature: Bytes,
}

impl Encode for Header {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.parent_id.encode(out);
        self.number.encode(out);
        self.timestamp.encode(out);
        self.total_score.encode(out);
        self.tx_root.encode(out);
        self.state_root.encode(out);
        self.producer.encode(out);
        self.signature.encode(out);
    }
}

impl Decode for Header {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Header {
            parent_id: Hash::decode(input)?,
            number: u64::decode(input)?,
            timestamp: u64::decode(input)?,
            total_score: u64::decode(input)?,
            tx_root: Hash::decode(input)?,
            state_root: Hash::decode(input)?,
            producer: Address::decode(input)?,
            signature: Bytes::decode(input)?,
        })
    }
}

/// Immutable block: header plus the ordered transaction body.
///
/// The id is the content address of the canonically encoded header, lazily
/// computed and cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: Header,
    transactions: Box<[Transaction]>,

    cached_id: HashCache,
}

impl Block {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Content address of this block.
    pub fn id(&self) -> Hash {
        self.cached_id.get_or_compute(|| {
            let mut h = Hash::sha3();
            h.update(BLOCK_ID_DOMAIN);
            self.header.encode(&mut h);
            h.finalize()
        })
    }

    /// Recomputes the transaction root of the body.
    pub fn body_tx_root(&self) -> Hash {
        MerkleTree::from_transactions(&self.transactions)
    }
}

impl Encode for Block {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.header.encode(out);
        self.transactions.encode(out);
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Block {
            header: Header::decode(input)?,
            transactions: Box::<[Transaction]>::decode(input)?,
            cached_id: HashCache::new(),
        })
    }
}

/// Staging struct for assembling a block.
///
/// The transaction root is derived from the accumulated body at
/// [`BlockBuilder::build`]; everything else is set explicitly by the
/// producer.
#[derive(Debug, Default)]
pub struct BlockBuilder {
    parent_id: Hash,
    number: u64,
    timestamp: u64,
    total_score: u64,
    state_root: Hash,
    producer: Address,
    signature: Bytes,
    transactions: Vec<Transaction>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_id(mut self, parent_id: Hash) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn number(mut self, number: u64) -> Self {
        self.number = number;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn total_score(mut self, total_score: u64) -> Self {
        self.total_score = total_score;
        self
    }

    pub fn state_root(mut self, state_root: Hash) -> Self {
        self.state_root = state_root;
        self
    }

    pub fn producer(mut self, producer: Address) -> Self {
        self.producer = producer;
        self
    }

    pub fn signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Appends one transaction to the body.
    pub fn transaction(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    /// Finalizes an immutable block, deriving the transaction root from
    /// the body.
    pub fn build(self) -> Block {
        let tx_root = MerkleTree::from_transactions(&self.transactions);
        Block {
            header: Header {
                parent_id: self.parent_id,
                number: self.number,
                timestamp: self.timestamp,
                total_score: self.total_score,
                tx_root,
                state_root: self.state_root,
                producer: self.producer,
                signature: self.signature,
            },
            transactions: self.transactions.into_boxed_slice(),
            cached_id: HashCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{Builder, Clause};
    use crate::crypto::key_pair::PrivateKey;
    use crate::utils::test_utils::utils::test_hash;

    #[test]
    fn build_derives_tx_root_from_body() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).expect("valid key");
        let tx = Builder::new()
            .nonce(1)
            .gas(21_000)
            .clause(Clause::create())
            .build()
            .sign(&key);

        let block = BlockBuilder::new()
            .parent_id(test_hash(1))
            .number(1)
            .transaction(tx.clone())
            .build();

        assert_eq!(
            block.header().tx_root,
            MerkleTree::from_transactions(&[tx])
        );
        assert_eq!(block.header().tx_root, block.body_tx_root());
    }

    #[test]
    fn empty_body_has_zero_tx_root() {
        let block = BlockBuilder::new().build();
        assert_eq!(block.header().tx_root, Hash::zero());
    }

    #[test]
    fn id_is_stable_and_content_derived() {
        let block = BlockBuilder::new()
            .parent_id(test_hash(1))
            .number(3)
            .total_score(10)
            .build();

        assert_eq!(block.id(), block.id());

        let other = BlockBuilder::new()
            .parent_id(test_hash(1))
            .number(3)
            .total_score(11)
            .build();
        assert_ne!(block.id(), other.id());
    }

    #[test]
    fn encode_decode_roundtrip_preserves_id() {
        let key = PrivateKey::from_bytes(&[2u8; 32]).expect("valid key");
        let block = BlockBuilder::new()
            .parent_id(test_hash(5))
            .number(8)
            .timestamp(1_700_000_000)
            .total_score(99)
            .state_root(test_hash(6))
            .producer(key.address())
            .transaction(
                Builder::new()
                    .nonce(0)
                    .gas(21_000)
                    .clause(Clause::call(key.address()).with_value(5))
                    .build()
                    .sign(&key),
            )
            .build();

        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, block);
        assert_eq!(decoded.id(), block.id());
        assert_eq!(decoded.to_bytes(), bytes);
    }
}
