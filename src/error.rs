//! Error types for config loading and certificate publishing

use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a usable snapshot from the config document
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config document {path} is missing or unreadable: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config document {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Failure to publish the certificate/key pair
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Either failure, for callers that need the pair published before going on
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }
}
