// src/lib.rs

pub mod config;
pub mod consensus;
pub mod digest;
pub mod ledger;
pub mod logging;
pub mod runtime;
pub mod snapshot;
pub mod types;

pub use consensus::{CandidateChain, ConsensusEngine};
pub use digest::{digest, DigestError, HashDigest};
pub use ledger::{ChainFault, FaultKind, Ledger, LedgerError, Tally};
pub use snapshot::LedgerSnapshot;
pub use types::{Block, CandidateId, Transaction, VoterFingerprint};
