use std::path::PathBuf;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::resource::ResourceError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum KitopsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML in '{path}': {message}")]
    ParseYaml { path: PathBuf, message: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv { var: String, reason: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseYaml {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}
