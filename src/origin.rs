//! Provenance tokens
//!
//! Every stage execution that actually runs mints a fresh [`OriginToken`].
//! Downstream stage inputs embed the tokens of the results they consumed,
//! so an upstream re-execution changes the downstream cache key even when
//! every other input field is unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of the execution that produced a stage output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginToken(Uuid);

impl OriginToken {
    /// Mint a token for a new execution
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form for log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for OriginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of origin tokens a stage input depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(BTreeSet<OriginToken>);

impl Origin {
    /// Empty origin (no upstream dependency)
    pub fn none() -> Self {
        Self::default()
    }

    /// Origin consisting of a single upstream execution
    pub fn of(token: OriginToken) -> Self {
        Self(BTreeSet::from([token]))
    }

    /// Union of two origins
    pub fn merge(mut self, other: &Origin) -> Self {
        self.0.extend(other.0.iter().copied());
        self
    }

    pub fn contains(&self, token: &OriginToken) -> bool {
        self.0.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OriginToken> {
        self.0.iter()
    }
}

impl From<OriginToken> for Origin {
    fn from(token: OriginToken) -> Self {
        Self::of(token)
    }
}

impl FromIterator<OriginToken> for Origin {
    fn from_iter<I: IntoIterator<Item = OriginToken>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
