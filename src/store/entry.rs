//! Cache entry records

use crate::origin::{Origin, OriginToken};
use crate::stage::StageKind;
use crate::store::key::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted stage result
///
/// The input is stored alongside the output so a stale entry can be handed
/// back to the builder registered for its stage kind after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Record format version
    pub format: u32,

    /// Key derived from (stage, input)
    pub key: CacheKey,

    /// Stage type that produced the output
    pub stage: StageKind,

    /// Store namespace (request scope or artifact coordinates)
    pub namespace: String,

    /// The stage input, as JSON
    pub input: serde_json::Value,

    /// The stage output, as JSON
    pub output: serde_json::Value,

    /// Whether the output is a persisted artifact at a stable location
    pub persisted: bool,

    /// When the producing execution finished
    pub produced_at: DateTime<Utc>,

    /// Token of the producing execution
    pub origin: OriginToken,

    /// Upstream tokens embedded in the input
    #[serde(default)]
    pub depends_on: Origin,
}

impl CacheEntry {
    /// Current record format
    pub const FORMAT: u32 = 1;

    /// Record a fresh execution
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: CacheKey,
        stage: StageKind,
        namespace: String,
        input: serde_json::Value,
        output: serde_json::Value,
        persisted: bool,
        depends_on: Origin,
    ) -> Self {
        Self {
            format: Self::FORMAT,
            key,
            stage,
            namespace,
            input,
            output,
            persisted,
            produced_at: Utc::now(),
            origin: OriginToken::mint(),
            depends_on,
        }
    }

    /// Whether this record was written by a compatible version
    pub fn is_compatible(&self) -> bool {
        self.format == Self::FORMAT
    }
}
