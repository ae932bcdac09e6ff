use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::consensus::{CandidateChain, ConsensusEngine};
use crate::ledger::{ChainFault, Ledger, LedgerError, Tally};
use crate::snapshot::{LedgerSnapshot, SnapshotError};
use crate::types::{Block, CandidateId, ChainState, Transaction, VoterFingerprint};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Snapshot error: {0}")]
    SnapshotError(#[from] SnapshotError),
    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
    #[error("{offered} candidate chains offered, at most {limit} accepted")]
    TooManyCandidates { offered: usize, limit: usize },
}

/// Service context that owns the authoritative ledger.
///
/// Whether voting is open, whether the candidate exists and how the voter
/// was fingerprinted are decided by the caller before it gets here.
pub struct Runtime {
    engine: Arc<ConsensusEngine>,
    config: NodeConfig,
}

impl Runtime {
    pub fn new(config: NodeConfig) -> Result<Self, RuntimeError> {
        let engine = ConsensusEngine::with_genesis()?;
        info!(hash = %engine.chain_state().latest_block_hash, "ledger initialized");
        Ok(Runtime {
            engine: Arc::new(engine),
            config,
        })
    }

    pub fn engine(&self) -> Arc<ConsensusEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Record a vote in the mempool and return the queued transaction.
    pub fn cast_vote(&self, voter: VoterFingerprint, candidate: CandidateId) -> Transaction {
        let transaction = Transaction::new(voter, candidate);
        self.engine.submit(transaction.clone());
        info!(candidate = %candidate, "vote queued");
        transaction
    }

    pub fn seal(&self) -> Result<Option<Block>, RuntimeError> {
        Ok(self.engine.seal()?)
    }

    pub fn validate(&self) -> Result<(), ChainFault> {
        self.engine.verify()
    }

    pub fn tally(&self) -> Tally {
        self.engine.tally()
    }

    pub fn chain_state(&self) -> ChainState {
        self.engine.chain_state()
    }

    pub fn export_json(&self) -> Result<String, RuntimeError> {
        Ok(self.engine.snapshot().to_json_pretty()?)
    }

    fn check_candidate_count(&self, offered: usize) -> Result<(), RuntimeError> {
        let limit = self.config.max_candidates;
        if offered > limit {
            warn!(offered, limit, "too many candidate chains, refusing fork resolution");
            return Err(RuntimeError::TooManyCandidates { offered, limit });
        }
        Ok(())
    }

    /// Fork resolution over every offered chain. More than
    /// `max_candidates` chains is refused outright and nothing is scanned.
    pub fn resolve_forks<C: CandidateChain>(
        &self,
        candidates: Vec<C>,
    ) -> Result<bool, RuntimeError> {
        self.check_candidate_count(candidates.len())?;
        Ok(self.engine.resolve_forks(candidates))
    }

    /// Decode framed snapshots and run fork resolution over them.
    pub fn resolve_frames(&self, frames: &[Vec<u8>]) -> Result<bool, RuntimeError> {
        self.check_candidate_count(frames.len())?;
        let candidates = frames
            .iter()
            .map(|frame| LedgerSnapshot::decode_frame(frame))
            .collect::<Result<Vec<_>, _>>()?;
        self.resolve_forks(candidates)
    }

    /// Discard everything and start over from a new genesis block.
    pub fn reset(&self) -> Result<(), RuntimeError> {
        let previous = self.engine.replace_ledger(Ledger::new()?);
        warn!(
            discarded_blocks = previous.len(),
            discarded_pending = previous.pending().len(),
            "ledger reset"
        );
        Ok(())
    }

    /// Final seal of pending votes if the config asks for it.
    pub fn shutdown(&self) -> Result<Option<Block>, RuntimeError> {
        if !self.config.seal_on_shutdown {
            info!("shutting down without sealing");
            return Ok(None);
        }
        let sealed = self.seal()?;
        info!(sealed = sealed.is_some(), "shutting down");
        Ok(sealed)
    }
}
