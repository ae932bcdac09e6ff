//! Core type definitions for the vote ledger.
//!
//! Transactions and blocks are immutable once built. A block computes its
//! hash at construction, and re-hashing an untouched block always yields
//! the stored value; that equality is what makes tampering visible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::digest::{self, DigestError, HashDigest};

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Anonymized voter identity. Opaque to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterFingerprint(String);

impl VoterFingerprint {
    /// Wraps an already-anonymized fingerprint.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        VoterFingerprint(fingerprint.into())
    }

    /// SHA-256 hex of a raw voter identifier.
    pub fn derive(raw_identifier: &str) -> Self {
        VoterFingerprint(digest::digest_bytes(raw_identifier.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single vote.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Transaction {
    voter_fingerprint: VoterFingerprint,
    candidate_reference: CandidateId,
    /// Unix timestamp in milliseconds
    created_at: u64,
}

impl Transaction {
    pub fn new(voter_fingerprint: VoterFingerprint, candidate_reference: CandidateId) -> Self {
        Self::with_timestamp(voter_fingerprint, candidate_reference, now_millis())
    }

    pub fn with_timestamp(
        voter_fingerprint: VoterFingerprint,
        candidate_reference: CandidateId,
        created_at: u64,
    ) -> Self {
        Transaction {
            voter_fingerprint,
            candidate_reference,
            created_at,
        }
    }

    pub fn voter_fingerprint(&self) -> &VoterFingerprint {
        &self.voter_fingerprint
    }

    pub fn candidate_reference(&self) -> CandidateId {
        self.candidate_reference
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Everything a block hash covers.
#[derive(Serialize)]
struct BlockHeader<'a> {
    index: u64,
    created_at: u64,
    transactions: &'a [Transaction],
    previous_hash: &'a HashDigest,
}

/// A sealed batch of votes.
///
/// Blocks are only produced by sealing (or decoded from a snapshot, in
/// which case the stored hash is kept verbatim and checked by validation).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Sequential block number starting from 0 (genesis)
    index: u64,
    /// Unix timestamp in milliseconds
    created_at: u64,
    /// Votes in submission order
    transactions: Vec<Transaction>,
    /// Hash of the previous block, `"0"` for genesis
    previous_hash: HashDigest,
    /// Hash of this block, fixed at construction
    hash: HashDigest,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: HashDigest,
    ) -> Result<Self, DigestError> {
        Self::with_timestamp(index, transactions, previous_hash, now_millis())
    }

    pub fn with_timestamp(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: HashDigest,
        created_at: u64,
    ) -> Result<Self, DigestError> {
        let hash = digest::digest(&BlockHeader {
            index,
            created_at,
            transactions: &transactions,
            previous_hash: &previous_hash,
        })?;
        Ok(Block {
            index,
            created_at,
            transactions,
            previous_hash,
            hash,
        })
    }

    pub fn genesis() -> Result<Self, DigestError> {
        Self::new(0, Vec::new(), HashDigest::genesis_sentinel())
    }

    /// Recalculate the hash from the block's current contents.
    ///
    /// # Errors
    ///
    /// Returns `DigestError::Encoding` if canonicalization fails.
    pub fn compute_hash(&self) -> Result<HashDigest, DigestError> {
        digest::digest(&BlockHeader {
            index: self.index,
            created_at: self.created_at,
            transactions: &self.transactions,
            previous_hash: &self.previous_hash,
        })
    }

    /// Whether the stored hash still matches the contents.
    pub fn hash_matches(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &HashDigest {
        &self.previous_hash
    }

    pub fn hash(&self) -> &HashDigest {
        &self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

// Tampering helpers: they copy a block, change one field and keep the old
// stored hash, which is exactly what an in-place edit would leave behind.
#[cfg(test)]
impl Block {
    pub(crate) fn tampered_previous_hash(&self, previous_hash: HashDigest) -> Block {
        Block {
            previous_hash,
            ..self.clone()
        }
    }

    pub(crate) fn tampered_transactions(&self, transactions: Vec<Transaction>) -> Block {
        Block {
            transactions,
            ..self.clone()
        }
    }

    pub(crate) fn tampered_index(&self, index: u64) -> Block {
        Block {
            index,
            ..self.clone()
        }
    }
}

/// Summary of the local chain.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ChainState {
    pub length: usize,
    pub latest_block_index: u64,
    pub latest_block_hash: HashDigest,
    pub pending_transactions: usize,
}
