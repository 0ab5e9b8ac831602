//! Cluster command error types.

use thiserror::Error;

/// Errors raised by the cluster command interface.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("kubectl {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Cluster unreachable: {0}")]
    Unreachable(String),

    #[error("Cluster authentication failed: {0}")]
    AuthFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("kubectl {command} failed: {message}")]
    CommandFailed { command: String, message: String },
}

impl ClusterError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::Unreachable(_) | ClusterError::Timeout { .. }
        )
    }
}

/// Classifies kubectl stderr into a more specific error variant.
pub fn classify_kubectl_error(command: &str, stderr: &str) -> ClusterError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();

    if lower.contains("notfound") || lower.contains("not found") {
        return ClusterError::NotFound(message);
    }

    if lower.contains("unable to connect to the server")
        || lower.contains("connection refused")
        || lower.contains("i/o timeout")
        || lower.contains("no such host")
        || lower.contains("tls handshake timeout")
        || lower.contains("was refused")
    {
        return ClusterError::Unreachable(message);
    }

    if lower.contains("unauthorized")
        || lower.contains("must be logged in")
        || lower.contains("provide credentials")
    {
        return ClusterError::AuthFailed(message);
    }

    if lower.contains("forbidden") {
        return ClusterError::Forbidden(message);
    }

    ClusterError::CommandFailed {
        command: command.to_string(),
        message,
    }
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
