//! Longest-valid-chain consensus over the local ledger.
//!
//! The engine owns the one authoritative [`Ledger`] behind a single mutex.
//! Every read or write of blocks and mempool goes through that lock, so a
//! submission either lands wholly before a seal or wholly after it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::ledger::{verify_blocks, ChainFault, Ledger, LedgerError, Tally};
use crate::snapshot::LedgerSnapshot;
use crate::types::{Block, ChainState, Transaction};

/// What fork resolution needs from a candidate chain.
pub trait CandidateChain {
    fn blocks(&self) -> &[Block];

    fn validate(&self) -> bool {
        verify_blocks(self.blocks()).is_ok()
    }

    /// Give up the blocks for adoption.
    fn into_blocks(self) -> Vec<Block>;
}

impl CandidateChain for Ledger {
    fn blocks(&self) -> &[Block] {
        Ledger::blocks(self)
    }

    fn validate(&self) -> bool {
        Ledger::validate(self)
    }

    fn into_blocks(self) -> Vec<Block> {
        self.take_blocks()
    }
}

impl<T: CandidateChain> CandidateChain for &T {
    fn blocks(&self) -> &[Block] {
        (**self).blocks()
    }

    fn validate(&self) -> bool {
        (**self).validate()
    }

    fn into_blocks(self) -> Vec<Block> {
        self.blocks().to_vec()
    }
}

pub struct ConsensusEngine {
    local: Mutex<Ledger>,
}

impl ConsensusEngine {
    pub fn new(ledger: Ledger) -> Self {
        ConsensusEngine {
            local: Mutex::new(ledger),
        }
    }

    /// An engine over a fresh genesis-only ledger.
    pub fn with_genesis() -> Result<Self, LedgerError> {
        Ok(Self::new(Ledger::new()?))
    }

    // No ledger operation can panic part-way through a mutation, so a
    // poisoned lock still guards a consistent ledger.
    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, transaction: Transaction) {
        self.lock().submit(transaction);
    }

    pub fn seal(&self) -> Result<Option<Block>, LedgerError> {
        self.lock().seal()
    }

    pub fn validate(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn verify(&self) -> Result<(), ChainFault> {
        let result = self.lock().verify();
        if let Err(fault) = &result {
            warn!(index = fault.index, kind = ?fault.kind, "local ledger failed validation");
        }
        result
    }

    pub fn validate_external<C: CandidateChain>(&self, candidate: &C) -> bool {
        candidate.validate()
    }

    /// Adopt the longest valid candidate, if it is strictly longer than
    /// the local chain.
    ///
    /// Candidates are scanned once, in order. A candidate only replaces the
    /// current best when it is strictly longer and validates; equal lengths
    /// never win. The local mempool survives adoption.
    pub fn resolve_forks<I, C>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = C>,
        C: CandidateChain,
    {
        let mut local = self.lock();
        let local_len = local.len();
        let mut max_len = local_len;
        let mut winner: Option<C> = None;

        for (position, candidate) in candidates.into_iter().enumerate() {
            let len = candidate.blocks().len();
            if len <= max_len {
                debug!(candidate = position, length = len, best = max_len, "candidate not longer");
                continue;
            }
            if !candidate.validate() {
                warn!(candidate = position, length = len, "rejected invalid candidate chain");
                continue;
            }
            max_len = len;
            winner = Some(candidate);
        }

        match winner {
            Some(chain) => {
                local.replace_blocks(chain.into_blocks());
                info!(
                    from = local_len,
                    to = max_len,
                    hash = %local.last_hash(),
                    "adopted longer chain"
                );
                true
            }
            None => false,
        }
    }

    /// Append a single block that extends the local tip.
    ///
    /// The block must link to the current last hash, carry the next index
    /// and hash to its stored value. Anything else is rejected and the
    /// ledger is left alone.
    pub fn append_if_linked(&self, block: Block) -> bool {
        let mut local = self.lock();

        if block.previous_hash() != local.last_hash() {
            debug!(
                expected = %local.last_hash(),
                got = %block.previous_hash(),
                "block does not link to local tip"
            );
            return false;
        }
        if block.index() != local.len() as u64 {
            debug!(expected = local.len(), got = block.index(), "block index out of sequence");
            return false;
        }
        if !block.hash_matches() {
            warn!(
                index = block.index(),
                hash = %block.hash(),
                "block hash does not match contents"
            );
            return false;
        }

        info!(index = block.index(), hash = %block.hash(), "linked block appended");
        local.push_block(block);
        true
    }

    /// Run `f` against the local ledger while holding the lock.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.lock())
    }

    /// Swap the whole local ledger, returning the previous one.
    pub fn replace_ledger(&self, ledger: Ledger) -> Ledger {
        std::mem::replace(&mut *self.lock(), ledger)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::from_ledger(&self.lock())
    }

    pub fn chain_state(&self) -> ChainState {
        self.lock().chain_state()
    }

    pub fn tally(&self) -> Tally {
        self.lock().tally()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Always false: the guarded ledger keeps at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
