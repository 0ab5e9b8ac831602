//! Resource-model error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning manifests or cluster listings into stubs.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Manifest document is empty")]
    EmptyDocument,

    #[error("Failed to parse YAML: {0}")]
    ParseYaml(String),

    #[error("Manifest document has no kind")]
    MissingKind,

    #[error("Failed to read manifest '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest directory not found: {0}")]
    ManifestDirNotFound(PathBuf),

    #[error("Expected a cluster listing of kind 'List', got '{0}'")]
    NotAList(String),
}

impl From<serde_yaml::Error> for ResourceError {
    fn from(err: serde_yaml::Error) -> Self {
        ResourceError::ParseYaml(err.to_string())
    }
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
