use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::digest::{DigestError, HashDigest};
use crate::types::{Block, CandidateId, ChainState, Transaction};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Digest error: {0}")]
    Digest(#[from] DigestError),
    #[error("A ledger needs at least a genesis block")]
    EmptyChain,
}

/// Which check a block failed during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// `index` is not the block's position in the chain.
    IndexOutOfSequence,
    /// `previous_hash` does not point at the prior block (or the sentinel).
    BrokenLink,
    /// The genesis block carries transactions.
    GenesisNotEmpty,
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// The block could not be canonicalized for hashing.
    Encoding,
    /// There are no blocks at all.
    MissingGenesis,
}

/// First failed check found by [`verify_blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainFault {
    pub index: usize,
    pub kind: FaultKind,
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {:?}", self.index, self.kind)
    }
}

/// Walk `blocks` in order and report the first broken invariant.
///
/// Per block the checks run in a fixed order: index sequencing, linkage to
/// the previous stored hash (the sentinel for genesis), then the stored
/// hash against a fresh recomputation.
pub fn verify_blocks(blocks: &[Block]) -> Result<(), ChainFault> {
    if blocks.is_empty() {
        return Err(ChainFault {
            index: 0,
            kind: FaultKind::MissingGenesis,
        });
    }

    for (position, block) in blocks.iter().enumerate() {
        let fault = |kind| ChainFault {
            index: position,
            kind,
        };

        if block.index() != position as u64 {
            return Err(fault(FaultKind::IndexOutOfSequence));
        }

        if position == 0 {
            if !block.previous_hash().is_genesis_sentinel() {
                return Err(fault(FaultKind::BrokenLink));
            }
            if !block.transactions().is_empty() {
                return Err(fault(FaultKind::GenesisNotEmpty));
            }
        } else if block.previous_hash() != blocks[position - 1].hash() {
            return Err(fault(FaultKind::BrokenLink));
        }

        match block.compute_hash() {
            Ok(recomputed) if recomputed == *block.hash() => {}
            Ok(_) => return Err(fault(FaultKind::HashMismatch)),
            Err(e) => {
                warn!(index = position, error = %e, "block could not be re-hashed");
                return Err(fault(FaultKind::Encoding));
            }
        }
    }

    Ok(())
}

/// Vote counts over sealed blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub counts: BTreeMap<CandidateId, u64>,
    pub total: u64,
}

impl Tally {
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut tally = Tally::default();
        for tx in blocks.iter().flat_map(|b| b.transactions()) {
            *tally.counts.entry(tx.candidate_reference()).or_insert(0) += 1;
            tally.total += 1;
        }
        tally
    }

    pub fn votes_for(&self, candidate: CandidateId) -> u64 {
        self.counts.get(&candidate).copied().unwrap_or(0)
    }
}

/// The chain of sealed blocks plus the mempool of pending votes.
///
/// `Ledger` is a plain value: callers that share one across threads keep it
/// behind a single lock (see [`crate::consensus::ConsensusEngine`]) so that
/// submit and seal never interleave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    blocks: Vec<Block>,
    mempool: Vec<Transaction>,
}

impl Ledger {
    /// A ledger holding only a fresh genesis block.
    pub fn new() -> Result<Self, LedgerError> {
        let genesis = Block::genesis()?;
        debug!(hash = %genesis.hash(), "genesis block created");
        Ok(Ledger {
            blocks: vec![genesis],
            mempool: Vec::new(),
        })
    }

    /// Materialize a ledger from received blocks, without validating them.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, LedgerError> {
        if blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(Ledger {
            blocks,
            mempool: Vec::new(),
        })
    }

    /// Queue a vote for the next seal.
    pub fn submit(&mut self, transaction: Transaction) {
        self.mempool.push(transaction);
    }

    /// Turn the mempool into a new block.
    ///
    /// Returns `Ok(None)` and leaves the ledger untouched when nothing is
    /// pending. On error the mempool is kept as it was.
    pub fn seal(&mut self) -> Result<Option<Block>, LedgerError> {
        if self.mempool.is_empty() {
            debug!(length = self.blocks.len(), "seal skipped, mempool empty");
            return Ok(None);
        }

        let previous_hash = self.last_block().hash().clone();
        let block = Block::new(self.blocks.len() as u64, self.mempool.clone(), previous_hash)?;

        self.blocks.push(block.clone());
        self.mempool.clear();

        info!(
            index = block.index(),
            hash = %block.hash(),
            transactions = block.transactions().len(),
            "block sealed"
        );
        Ok(Some(block))
    }

    pub fn validate(&self) -> bool {
        self.verify().is_ok()
    }

    /// Like [`Ledger::validate`] but names the first offending block.
    pub fn verify(&self) -> Result<(), ChainFault> {
        verify_blocks(&self.blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.mempool
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false for a constructed ledger: every constructor requires
    /// at least a genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // from_blocks and new both guarantee a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn last_hash(&self) -> &HashDigest {
        self.last_block().hash()
    }

    /// Votes per candidate across sealed blocks; pending votes are not counted.
    pub fn tally(&self) -> Tally {
        Tally::from_blocks(&self.blocks)
    }

    pub fn chain_state(&self) -> ChainState {
        let last = self.last_block();
        ChainState {
            length: self.blocks.len(),
            latest_block_index: last.index(),
            latest_block_hash: last.hash().clone(),
            pending_transactions: self.mempool.len(),
        }
    }

    pub(crate) fn take_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub(crate) fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Swap in an adopted chain. Pending votes stay in the mempool.
    pub(crate) fn replace_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
    }

    #[cfg(test)]
    pub(crate) fn overwrite_block(&mut self, index: usize, block: Block) {
        self.blocks[index] = block;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoterFingerprint;

    fn vote(fingerprint: &str, candidate: u64) -> Transaction {
        Transaction::new(VoterFingerprint::new(fingerprint), CandidateId(candidate))
    }

    fn sealed_ledger(blocks: usize) -> Ledger {
        let mut ledger = Ledger::new().unwrap();
        for i in 0..blocks {
            ledger.submit(vote(&format!("voter-{i}"), i as u64 % 3));
            ledger.seal().unwrap();
        }
        ledger
    }

    #[test]
    fn test_new_ledger_holds_only_genesis() {
        let ledger = Ledger::new().unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_empty());
        assert!(ledger.pending().is_empty());
        let genesis = &ledger.blocks()[0];
        assert_eq!(genesis.index(), 0);
        assert!(genesis.previous_hash().is_genesis_sentinel());
        assert!(genesis.transactions().is_empty());
        assert!(ledger.validate());
    }

    #[test]
    fn test_submit_queues_in_order() {
        let mut ledger = Ledger::new().unwrap();
        ledger.submit(vote("hash1", 1));
        ledger.submit(vote("hash2", 2));
        assert_eq!(ledger.pending().len(), 2);
        assert_eq!(ledger.pending()[0].voter_fingerprint().as_str(), "hash1");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_seal_snapshots_mempool() {
        let mut ledger = Ledger::new().unwrap();
        let prior_len = ledger.len();
        let prior_hash = ledger.last_hash().clone();

        ledger.submit(vote("a", 1));
        ledger.submit(vote("b", 2));
        let block = ledger.seal().unwrap().expect("block sealed");

        assert_eq!(block.index(), prior_len as u64);
        assert_eq!(block.previous_hash(), &prior_hash);
        let candidates: Vec<_> = block
            .transactions()
            .iter()
            .map(|t| t.candidate_reference())
            .collect();
        assert_eq!(candidates, vec![CandidateId(1), CandidateId(2)]);
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.last_block(), &block);
        assert!(ledger.validate());
    }

    #[test]
    fn test_seal_on_empty_mempool_is_noop() {
        let mut ledger = sealed_ledger(1);
        let before = ledger.clone();
        assert!(ledger.seal().unwrap().is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_sealed_chain_stays_valid() {
        assert!(sealed_ledger(5).validate());
    }

    #[test]
    fn test_previous_hash_tampering_detected() {
        let mut ledger = sealed_ledger(2);
        let tampered = ledger.blocks()[1].tampered_previous_hash(HashDigest::from("X_INVALID"));
        ledger.overwrite_block(1, tampered);
        assert!(!ledger.validate());
        assert_eq!(
            ledger.verify(),
            Err(ChainFault {
                index: 1,
                kind: FaultKind::BrokenLink
            })
        );
    }

    #[test]
    fn test_transaction_tampering_detected() {
        let mut ledger = sealed_ledger(3);
        let original = &ledger.blocks()[2];
        let forged = Transaction::with_timestamp(
            original.transactions()[0].voter_fingerprint().clone(),
            CandidateId(999),
            original.transactions()[0].created_at(),
        );
        let tampered = original.tampered_transactions(vec![forged]);
        ledger.overwrite_block(2, tampered);
        assert_eq!(
            ledger.verify(),
            Err(ChainFault {
                index: 2,
                kind: FaultKind::HashMismatch
            })
        );
    }

    #[test]
    fn test_index_checked_before_linkage() {
        let mut ledger = sealed_ledger(2);
        let tampered = ledger.blocks()[1]
            .tampered_index(5)
            .tampered_previous_hash(HashDigest::from("X"));
        ledger.overwrite_block(1, tampered);
        assert_eq!(ledger.verify().unwrap_err().kind, FaultKind::IndexOutOfSequence);
    }

    #[test]
    fn test_genesis_linkage_checked() {
        let mut ledger = sealed_ledger(1);
        let tampered = ledger.blocks()[0].tampered_previous_hash(HashDigest::from("1"));
        ledger.overwrite_block(0, tampered);
        assert_eq!(
            ledger.verify(),
            Err(ChainFault {
                index: 0,
                kind: FaultKind::BrokenLink
            })
        );
    }

    #[test]
    fn test_genesis_with_transactions_rejected() {
        let mut ledger = Ledger::new().unwrap();
        let tampered = ledger.blocks()[0].tampered_transactions(vec![vote("x", 1)]);
        ledger.overwrite_block(0, tampered);
        assert_eq!(ledger.verify().unwrap_err().kind, FaultKind::GenesisNotEmpty);
    }

    #[test]
    fn test_from_blocks_requires_genesis() {
        assert!(matches!(Ledger::from_blocks(Vec::new()), Err(LedgerError::EmptyChain)));
        assert_eq!(verify_blocks(&[]).unwrap_err().kind, FaultKind::MissingGenesis);
    }

    #[test]
    fn test_tally_ignores_pending() {
        let mut ledger = Ledger::new().unwrap();
        ledger.submit(vote("a", 1));
        ledger.submit(vote("b", 1));
        ledger.submit(vote("c", 2));
        ledger.seal().unwrap();
        ledger.submit(vote("d", 2));

        let tally = ledger.tally();
        assert_eq!(tally.total, 3);
        assert_eq!(tally.votes_for(CandidateId(1)), 2);
        assert_eq!(tally.votes_for(CandidateId(2)), 1);
        assert_eq!(tally.votes_for(CandidateId(3)), 0);
    }

    #[test]
    fn test_chain_state() {
        let mut ledger = sealed_ledger(2);
        ledger.submit(vote("p", 1));
        let state = ledger.chain_state();
        assert_eq!(state.length, 3);
        assert_eq!(state.latest_block_index, 2);
        assert_eq!(&state.latest_block_hash, ledger.last_hash());
        assert_eq!(state.pending_transactions, 1);
    }
}
