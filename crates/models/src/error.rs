//! Error types for the models crate.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint { path: PathBuf, reason: String },

    #[error("failed to save checkpoint to {path}: {reason}")]
    SaveCheckpoint { path: PathBuf, reason: String },

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint metadata {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ModelError {
    #[must_use]
    pub fn load_checkpoint(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn save_checkpoint(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SaveCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
