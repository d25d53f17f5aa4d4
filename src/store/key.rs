//! Cache key derivation
//!
//! A key is the SHA256 of the stage id and the canonical JSON encoding of
//! the stage input. `serde_json::Value` keeps object keys sorted, so two
//! inputs that compare equal always encode to the same bytes.

use crate::error::GristResult;
use crate::stage::StageKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identifier of a (stage type, input) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a stage input already lowered to JSON
    pub fn derive(kind: StageKind, input: &serde_json::Value) -> GristResult<Self> {
        let canonical = serde_json::to_vec(input)?;

        let mut hasher = Sha256::new();
        hasher.update(kind.id().as_bytes());
        hasher.update([0u8]);
        hasher.update(&canonical);

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Derive the key for a typed input
    pub fn of<T: Serialize>(kind: StageKind, input: &T) -> GristResult<Self> {
        Self::derive(kind, &serde_json::to_value(input)?)
    }

    /// Wrap an existing hex digest (e.g. read back from a slot file name)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA256 of a string, first 12 hex chars
pub fn short_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();

    hex::encode(&result[..6])
}
