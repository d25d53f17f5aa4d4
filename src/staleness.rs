//! Staleness policy
//!
//! Decides whether a cached result may be reused without re-running the
//! stage that produced it. Windows are per stage type: remote grammars
//! change more often than published dependency artifacts.

use crate::store::CacheEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How long a cache entry may be trusted without re-validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessWindow {
    /// Never re-validate once cached
    Never,
    /// Re-validate once the entry is at least this many seconds old
    Seconds(u64),
}

impl StalenessWindow {
    /// Always re-validate
    pub const ZERO: Self = Self::Seconds(0);

    pub fn hours(hours: u64) -> Self {
        Self::Seconds(hours * 60 * 60)
    }

    pub fn days(days: u64) -> Self {
        Self::hours(days * 24)
    }

    /// Window as a chrono duration
    ///
    /// `None` for [`StalenessWindow::Never`] and for windows too long for a
    /// duration, which can never elapse either.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::Seconds(secs) => i64::try_from(*secs).ok().and_then(Duration::try_seconds),
        }
    }
}

impl From<Option<u64>> for StalenessWindow {
    fn from(secs: Option<u64>) -> Self {
        secs.map_or(Self::Never, Self::Seconds)
    }
}

impl fmt::Display for StalenessWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Seconds(secs) => write!(f, "{}s", secs),
        }
    }
}

/// Outcome of a freshness check, with a reason when stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(String),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Check an entry against a window, explaining why it is stale
pub fn check(entry: &CacheEntry, window: StalenessWindow, now: DateTime<Utc>) -> Freshness {
    let Some(limit) = window.as_duration() else {
        return Freshness::Fresh;
    };

    let age = now - entry.produced_at;
    if age < Duration::zero() {
        return Freshness::Stale(format!(
            "produced in the future ({}), clock skew",
            entry.produced_at.to_rfc3339()
        ));
    }

    if age >= limit {
        Freshness::Stale(format!(
            "{}s old, window is {}",
            age.num_seconds(),
            window
        ))
    } else {
        Freshness::Fresh
    }
}

/// Stale iff the entry's age has reached the window
pub fn is_stale(entry: &CacheEntry, window: StalenessWindow, now: DateTime<Utc>) -> bool {
    !check(entry, window, now).is_fresh()
}
