//! Source-control error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating commits or checking them out.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid commit id '{0}': expected 40 hexadecimal characters")]
    InvalidCommit(String),

    #[error("Failed to prepare checkout directory '{path}': {source}")]
    PrepareDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkout directory '{0}' exists but is not a git repository")]
    NotARepository(PathBuf),

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git operation timed out after {0}s")]
    GitTimeout(u64),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Unknown commit: {0}")]
    UnknownCommit(String),
}

impl SourceError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::GitNetworkError(_) | SourceError::GitTimeout(_)
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> SourceError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return SourceError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
    {
        return SourceError::GitAuthFailed(stderr.trim().to_string());
    }

    if lower.contains("unknown revision")
        || lower.contains("did not match any")
        || lower.contains("reference is not a tree")
        || lower.contains("bad object")
    {
        return SourceError::UnknownCommit(stderr.trim().to_string());
    }

    SourceError::GitOperation(stderr.trim().to_string())
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
