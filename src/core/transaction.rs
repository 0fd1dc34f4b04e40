//! Transaction model: clauses, builder, signing, and work scoring.
//!
//! A transaction bundles an ordered sequence of clauses under one nonce,
//! gas allowance and signature. Its id and signature are computed over the
//! canonical encoding, so `decode(encode(tx))` must re-encode to the exact
//! same bytes.

use crate::crypto::key_pair::{PrivateKey, recover_signer};
use crate::types::address::Address;
use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{Hash, HashCache};
use crate::types::serializable_signature::SerializableSignature;
use primitive_types::U256;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

const SIGNING_DOMAIN: &[u8] = b"TX";
const ID_DOMAIN: &[u8] = b"TXID";
const WORK_DOMAIN: &[u8] = b"TXWORK";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction is unsigned or its signature does not recover to a
    /// valid public key.
    #[error("invalid signature")]
    InvalidSignature,
}

/// Destination of a single clause.
///
/// A tagged variant rather than a nullable address: contract creation is a
/// distinct instruction, not a call to "no one".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseTarget {
    /// Deploys the clause data as new contract code.
    Create,
    /// Calls or transfers to an existing account.
    Call(Address),
}

impl Encode for ClauseTarget {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            ClauseTarget::Create => 0u8.encode(out),
            ClauseTarget::Call(addr) => {
                1u8.encode(out);
                addr.encode(out);
            }
        }
    }
}

impl Decode for ClauseTarget {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(ClauseTarget::Create),
            1 => Ok(ClauseTarget::Call(Address::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// One call-or-create instruction inside a transaction.
///
/// `value` and `data` are opaque here; only the execution layer interprets
/// them. The model imposes no clause-count limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub to: ClauseTarget,
    pub value: u128,
    pub data: Bytes,
}

impl Clause {
    /// A contract-creation clause with no value or data.
    pub fn create() -> Self {
        Self {
            to: ClauseTarget::Create,
            value: 0,
            data: Bytes::default(),
        }
    }

    /// A call clause targeting `to` with no value or data.
    pub fn call(to: Address) -> Self {
        Self {
            to: ClauseTarget::Call(to),
            value: 0,
            data: Bytes::default(),
        }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }
}

impl Encode for Clause {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }
}

impl Decode for Clause {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Clause {
            to: ClauseTarget::decode(input)?,
            value: u128::decode(input)?,
            data: Bytes::decode(input)?,
        })
    }
}

/// An immutable, canonically encoded transaction.
///
/// Built through [`Builder`]; signing produces a new value rather than
/// mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    nonce: u64,
    gas: u64,
    clauses: Box<[Clause]>,
    signature: Option<SerializableSignature>,

    /// Lazily computed id over the full encoding; ignored by equality.
    cached_id: HashCache,
    /// Lazily computed signing hash over the unsigned fields.
    cached_signing: HashCache,
}

impl Transaction {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn gas(&self) -> u64 {
        self.gas
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Digest of the unsigned fields; the message covered by the
    /// signature.
    pub fn signing_hash(&self) -> Hash {
        self.cached_signing.get_or_compute(|| {
            let mut h = Hash::sha3();
            h.update(SIGNING_DOMAIN);
            self.nonce.encode(&mut h);
            self.gas.encode(&mut h);
            self.clauses.encode(&mut h);
            h.finalize()
        })
    }

    /// Unique transaction id: digest of the full canonical encoding,
    /// signature included. Cached after the first call.
    pub fn id(&self) -> Hash {
        self.cached_id.get_or_compute(|| {
            let mut h = Hash::sha3();
            h.update(ID_DOMAIN);
            self.encode(&mut h);
            h.finalize()
        })
    }

    /// Attaches a signature over [`Transaction::signing_hash`].
    pub fn sign(self, key: &PrivateKey) -> Transaction {
        let signature = key.sign_hash(&self.signing_hash());
        Transaction {
            nonce: self.nonce,
            gas: self.gas,
            clauses: self.clauses,
            signature: Some(signature),
            cached_id: HashCache::new(),
            cached_signing: self.cached_signing,
        }
    }

    /// Recovers the address that signed this transaction.
    pub fn signer(&self) -> Result<Address, TransactionError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or(TransactionError::InvalidSignature)?;
        recover_signer(&self.signing_hash(), signature)
            .ok_or(TransactionError::InvalidSignature)
    }

    /// Returns the work evaluator for this transaction and claimed signer.
    ///
    /// The result is a pure function of `(signer, transaction, iteration)`:
    /// verifiers recompute it to check a claimed work value, and provers
    /// search the iteration space for a value at or above their target.
    /// There is no monotonicity in the iteration argument.
    pub fn evaluate_work(&self, signer: Address) -> impl Fn(u64) -> U256 + Send + Sync + 'static {
        let prefix = Hash::sha3()
            .chain(WORK_DOMAIN)
            .chain(signer.as_slice())
            .chain(self.signing_hash().as_slice())
            .finalize();

        move |iteration: u64| {
            let digest = Hash::sha3()
                .chain(prefix.as_slice())
                .chain(&iteration.to_le_bytes())
                .finalize();
            U256::from_big_endian(digest.as_slice())
        }
    }
}

impl Encode for Transaction {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.nonce.encode(out);
        self.gas.encode(out);
        self.clauses.encode(out);
        self.signature.encode(out);
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Transaction {
            nonce: u64::decode(input)?,
            gas: u64::decode(input)?,
            clauses: Box::<[Clause]>::decode(input)?,
            signature: Option::decode(input)?,
            cached_id: HashCache::new(),
            cached_signing: HashCache::new(),
        })
    }
}

/// Incremental transaction builder.
///
/// Accumulates fields and clauses, then [`Builder::build`] finalizes an
/// immutable unsigned transaction.
#[derive(Debug, Default)]
pub struct Builder {
    nonce: u64,
    gas: u64,
    clauses: Vec<Clause>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    /// Appends one clause; clauses execute in insertion order.
    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            nonce: self.nonce,
            gas: self.gas,
            clauses: self.clauses.into_boxed_slice(),
            signature: None,
            cached_id: HashCache::new(),
            cached_signing: HashCache::new(),
        }
    }
}

/// Scans `iterations` for a work value at or above `target`.
///
/// CPU-bound and embarrassingly parallel: callers may split the iteration
/// space across threads, each with its own range. The cancel flag is
/// checked every iteration so a deadline can stop the search; no shared
/// state is touched.
pub fn search_work(
    evaluate: impl Fn(u64) -> U256,
    target: U256,
    iterations: Range<u64>,
    cancel: &AtomicBool,
) -> Option<(u64, U256)> {
    for i in iterations {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let work = evaluate(i);
        if work >= target {
            return Some((i, work));
        }
    }
    None
}
