//! Append-only chain store with fork-aware head selection.
//!
//! Blocks form a tree rooted at the unique genesis: every stored block
//! references an already-stored parent, and multiple children per parent
//! are allowed. The best head is the stored block with the greatest
//! `total_score`; ties keep the block that was admitted first, so head
//! selection is deterministic per node and survives restarts through the
//! persisted admission counter.

use crate::core::block::{Block, Header};
use crate::info;
use crate::storage::kv::{
    KEY_BEST_BLOCK, KEY_BLOCK_SEQ, KvError, KvStore, NS_BLOCK, WriteBatch, ns_key,
};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// No block with the requested ID is stored.
    #[error("block {0} not found")]
    NotFound(Hash),
    /// The block references a parent that was never stored.
    #[error("parent block {0} not found")]
    ParentNotFound(Hash),
    /// A genesis block has already been written.
    #[error("genesis block already written")]
    AlreadyInitialized,
    /// No genesis block has been written yet.
    #[error("chain has no genesis block")]
    NotInitialized,
    /// The genesis block must be number 0 with no parent.
    #[error("invalid genesis block: expected number 0 with no parent")]
    InvalidGenesis,
    /// Header number does not follow the parent.
    #[error("invalid block number: expected {expected}, got {actual}")]
    InvalidNumber { expected: u64, actual: u64 },
    /// Total score must strictly accumulate along the chain.
    #[error("invalid block: total score {score} does not exceed parent score {parent}")]
    ScoreNotIncreasing { score: u64, parent: u64 },
    /// Header transaction root does not match the body.
    #[error("invalid block: header tx root {header} does not match body root {body}")]
    TxRootMismatch { header: Hash, body: Hash },
    /// A stored record is undecodable. Store corruption, never reported as
    /// a plain lookup miss.
    #[error("stored block {0} is undecodable")]
    CorruptBlock(Hash),
    #[error(transparent)]
    Store(#[from] KvError),
}

/// Block record as persisted: the admission sequence number backs the
/// first-stored-wins tie-break across restarts.
struct StoredBlock {
    seq: u64,
    block: Block,
}

impl Encode for StoredBlock {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.seq.encode(out);
        self.block.encode(out);
    }
}

impl Decode for StoredBlock {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(StoredBlock {
            seq: u64::decode(input)?,
            block: Block::decode(input)?,
        })
    }
}

#[derive(Clone, Copy)]
struct Head {
    id: Hash,
    score: u64,
}

struct Inner {
    head: Option<Head>,
    next_seq: u64,
}

/// Chain store over a raw byte store.
///
/// `add_block` calls are serialized by the internal mutex; `get_block` and
/// `best_block` read the store directly and may run concurrently with an
/// in-flight admission, observing either its pre- or post-state.
pub struct Chain<S: KvStore> {
    store: S,
    inner: Mutex<Inner>,
}

impl<S: KvStore> Chain<S> {
    /// Opens the chain store, resuming the best head and admission counter
    /// from persisted metadata when present.
    pub fn new(store: S) -> Result<Self, ChainError> {
        let head = match store.get(KEY_BEST_BLOCK)? {
            Some(raw) => {
                let id = Hash::from_slice(&raw)
                    .ok_or_else(|| KvError::Unavailable("best-block key is malformed".into()))?;
                let stored = read_stored(&store, id)?.ok_or(ChainError::CorruptBlock(id))?;
                Some(Head {
                    id,
                    score: stored.block.header().total_score,
                })
            }
            None => None,
        };

        let next_seq = match store.get(KEY_BLOCK_SEQ)? {
            Some(raw) => u64::from_bytes(&raw).map_err(|_| {
                KvError::Unavailable("block sequence counter is malformed".into())
            })?,
            None => 0,
        };

        Ok(Self {
            store,
            inner: Mutex::new(Inner { head, next_seq }),
        })
    }

    /// Writes the unique number-0, parent-less genesis block.
    ///
    /// Accepted exactly once; any later call fails with
    /// [`ChainError::AlreadyInitialized`].
    pub fn write_genesis(&self, genesis: Block) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.head.is_some() {
            return Err(ChainError::AlreadyInitialized);
        }
        if genesis.header().number != 0 || !genesis.header().parent_id.is_zero() {
            return Err(ChainError::InvalidGenesis);
        }

        let id = genesis.id();
        let score = genesis.header().total_score;
        let seq = inner.next_seq;

        let mut batch = WriteBatch::new();
        batch.put(
            ns_key(NS_BLOCK, &id),
            StoredBlock {
                seq,
                block: genesis,
            }
            .to_bytes(),
        );
        batch.put(KEY_BLOCK_SEQ.to_vec(), (seq + 1).to_bytes());
        batch.put(KEY_BEST_BLOCK.to_vec(), id.as_slice().to_vec());
        self.store.write(batch)?;

        inner.next_seq = seq + 1;
        inner.head = Some(Head { id, score });

        info!("chain initialized: genesis={id}");
        Ok(())
    }

    /// Validates parent linkage and stores the block, re-evaluating the
    /// best head.
    ///
    /// Exact duplicates are an idempotent no-op. With `validate` set, the
    /// header must be well-formed against its parent (number, score
    /// accumulation, transaction root); an invalid block is rejected and
    /// not stored.
    pub fn add_block(&self, block: Block, validate: bool) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.head.is_none() {
            return Err(ChainError::ParentNotFound(block.header().parent_id));
        }

        let id = block.id();
        if read_stored(&self.store, id)?.is_some() {
            // same ID means same header: admitting it again changes nothing
            return Ok(());
        }

        let parent_id = block.header().parent_id;
        let parent = read_stored(&self.store, parent_id)?
            .ok_or(ChainError::ParentNotFound(parent_id))?;

        if validate {
            validate_against_parent(&block, parent.block.header())?;
        }

        let score = block.header().total_score;
        let seq = inner.next_seq;
        let number = block.header().number;

        let mut batch = WriteBatch::new();
        batch.put(ns_key(NS_BLOCK, &id), StoredBlock { seq, block }.to_bytes());
        batch.put(KEY_BLOCK_SEQ.to_vec(), (seq + 1).to_bytes());

        // strictly greater score moves the head; a tie keeps the earlier
        // admission
        let head = inner.head.as_ref().unwrap();
        let new_head = score > head.score;
        if new_head {
            batch.put(KEY_BEST_BLOCK.to_vec(), id.as_slice().to_vec());
        }
        self.store.write(batch)?;

        inner.next_seq = seq + 1;
        if new_head {
            inner.head = Some(Head { id, score });
            info!("new best block: id={id} number={number} score={score}");
        } else {
            info!("stored side block: id={id} number={number} score={score}");
        }
        Ok(())
    }

    /// Returns `true` if a block with the given ID is stored.
    pub fn has_block(&self, id: Hash) -> Result<bool, ChainError> {
        Ok(read_stored(&self.store, id)?.is_some())
    }

    /// Retrieves a block by its ID.
    pub fn get_block(&self, id: Hash) -> Result<Block, ChainError> {
        read_stored(&self.store, id)?
            .map(|stored| stored.block)
            .ok_or(ChainError::NotFound(id))
    }

    /// Returns the current best head.
    pub fn best_block(&self) -> Result<Block, ChainError> {
        let head = self
            .inner
            .lock()
            .unwrap()
            .head
            .ok_or(ChainError::NotInitialized)?;
        self.get_block(head.id)
    }
}

fn read_stored<S: KvStore>(store: &S, id: Hash) -> Result<Option<StoredBlock>, ChainError> {
    match store.get(&ns_key(NS_BLOCK, &id))? {
        Some(raw) => StoredBlock::from_bytes(&raw)
            .map(Some)
            .map_err(|_| ChainError::CorruptBlock(id)),
        None => Ok(None),
    }
}

fn validate_against_parent(block: &Block, parent: &Header) -> Result<(), ChainError> {
    let header = block.header();

    let expected = parent.number + 1;
    if header.number != expected {
        return Err(ChainError::InvalidNumber {
            expected,
            actual: header.number,
        });
    }

    if header.total_score <= parent.total_score {
        return Err(ChainError::ScoreNotIncreasing {
            score: header.total_score,
            parent: parent.total_score,
        });
    }

    let body = block.body_tx_root();
    if header.tx_root != body {
        return Err(ChainError::TxRootMismatch {
            header: header.tx_root,
            body,
        });
    }

    Ok(())
}
