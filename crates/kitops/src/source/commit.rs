//! Commit identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::SourceError;

static FULL_SHA1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").unwrap());

/// Identifier of a commit to reconcile.
///
/// The queue treats it as opaque; [`CommitId::parse`] accepts only full
/// 40-character SHA-1 ids and normalizes them to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Wraps `id` without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validates a full hexadecimal commit id.
    pub fn parse(id: &str) -> Result<Self, SourceError> {
        let id = id.trim();
        if FULL_SHA1.is_match(id) {
            Ok(Self(id.to_ascii_lowercase()))
        } else {
            Err(SourceError::InvalidCommit(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
