//! Serialized form of a chain.
//!
//! Candidate ledgers reach this crate already materialized, usually decoded
//! from one of the two encodings here: a JSON document for inspection and
//! export, or a length-prefixed bincode frame. Decoding keeps every stored
//! hash verbatim; nothing is recomputed, so a forged block stays forged
//! until validation catches it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::CandidateChain;
use crate::ledger::{Ledger, LedgerError};
use crate::types::Block;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Frame shorter than its length prefix")]
    TruncatedFrame,
    #[error("Frame length {declared} does not match body length {actual}")]
    FrameLengthMismatch { declared: usize, actual: usize },
    #[error("Frame body too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub blocks: Vec<Block>,
}

impl LedgerSnapshot {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        LedgerSnapshot {
            blocks: ledger.blocks().to_vec(),
        }
    }

    /// Materialize as a ledger with an empty mempool. No validation.
    pub fn into_ledger(self) -> Result<Ledger, LedgerError> {
        Ledger::from_blocks(self.blocks)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// `u32` little-endian body length followed by the bincode body.
    pub fn encode_frame(&self) -> Result<Vec<u8>, SnapshotError> {
        let body = bincode::serialize(self)?;
        let length =
            u32::try_from(body.len()).map_err(|_| SnapshotError::FrameTooLarge(body.len()))?;

        let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    pub fn decode_frame(data: &[u8]) -> Result<Self, SnapshotError> {
        if data.len() < LENGTH_PREFIX {
            return Err(SnapshotError::TruncatedFrame);
        }
        let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let body = &data[LENGTH_PREFIX..];
        if body.len() < declared {
            return Err(SnapshotError::TruncatedFrame);
        }
        if body.len() > declared {
            return Err(SnapshotError::FrameLengthMismatch {
                declared,
                actual: body.len(),
            });
        }
        Ok(bincode::deserialize(body)?)
    }
}

impl CandidateChain for LedgerSnapshot {
    fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateId, Transaction, VoterFingerprint};

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new().unwrap();
        ledger.submit(Transaction::new(VoterFingerprint::derive("alice"), CandidateId(1)));
        ledger.submit(Transaction::new(VoterFingerprint::derive("bob"), CandidateId(2)));
        ledger.seal().unwrap();
        ledger
    }

    #[test]
    fn test_json_document_shape() {
        let snapshot = LedgerSnapshot::from_ledger(&sample_ledger());
        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let genesis = &value["blocks"][0];
        assert_eq!(genesis["index"], 0);
        assert_eq!(genesis["previous_hash"], "0");
        assert_eq!(genesis["hash"].as_str().unwrap().len(), 64);

        let block = &value["blocks"][1];
        assert_eq!(block["previous_hash"], genesis["hash"]);
        assert_eq!(block["transactions"][1]["candidate_reference"], 2);
        assert!(block["transactions"][0]["voter_fingerprint"].is_string());
        assert!(block["created_at"].is_u64());
    }

    #[test]
    fn test_decoded_snapshot_validates() {
        let snapshot = LedgerSnapshot::from_ledger(&sample_ledger());
        let decoded = LedgerSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert!(decoded.validate());

        let framed = LedgerSnapshot::decode_frame(&snapshot.encode_frame().unwrap()).unwrap();
        assert_eq!(framed, snapshot);
        assert!(framed.into_ledger().unwrap().validate());
    }

    #[test]
    fn test_forged_json_fails_validation() {
        let snapshot = LedgerSnapshot::from_ledger(&sample_ledger());
        let json = snapshot.to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["blocks"][1]["transactions"][0]["candidate_reference"] = serde_json::json!(999);

        let forged = LedgerSnapshot::from_json(&value.to_string()).unwrap();
        assert!(!forged.validate());
    }

    #[test]
    fn test_frame_errors() {
        assert!(matches!(
            LedgerSnapshot::decode_frame(&[1, 0]),
            Err(SnapshotError::TruncatedFrame)
        ));

        let mut frame = LedgerSnapshot::from_ledger(&sample_ledger()).encode_frame().unwrap();
        frame.push(0);
        assert!(matches!(
            LedgerSnapshot::decode_frame(&frame),
            Err(SnapshotError::FrameLengthMismatch { .. })
        ));

        frame.truncate(frame.len() - 2);
        assert!(matches!(
            LedgerSnapshot::decode_frame(&frame),
            Err(SnapshotError::TruncatedFrame)
        ));
    }

    #[test]
    fn test_empty_snapshot_cannot_become_ledger() {
        let empty = LedgerSnapshot { blocks: Vec::new() };
        assert!(!empty.validate());
        assert!(matches!(empty.into_ledger(), Err(LedgerError::EmptyChain)));
    }
}
