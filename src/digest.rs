//! Canonical serialization and SHA-256 hashing.
//!
//! Values are first lowered to a `serde_json::Value`. Its object type is a
//! `BTreeMap`, so map-like fields come out key-sorted regardless of the
//! order they were built in, while sequences keep their order. The compact
//! JSON encoding of that value is what gets hashed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Width of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("Canonical encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Lowercase hex digest, or the genesis sentinel when used as a back-link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    pub fn genesis_sentinel() -> Self {
        HashDigest(GENESIS_PREVIOUS_HASH.to_string())
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        HashDigest(hex::encode(bytes))
    }

    pub fn is_genesis_sentinel(&self) -> bool {
        self.0 == GENESIS_PREVIOUS_HASH
    }

    /// True for a well-formed 64-char lowercase hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == DIGEST_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HashDigest {
    fn from(s: &str) -> Self {
        HashDigest(s.to_string())
    }
}

/// Canonical byte form of `value`.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DigestError> {
    let canonical = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canonical)?)
}

/// SHA-256 over the canonical form of `value`.
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<HashDigest, DigestError> {
    let bytes = canonical_bytes(value)?;
    Ok(digest_bytes(&bytes))
}

pub fn digest_bytes(bytes: &[u8]) -> HashDigest {
    let hash: [u8; 32] = Sha256::digest(bytes).into();
    HashDigest::from_bytes(&hash)
}
