//! Error types for corrode_models.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, saving or loading the classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Weights file missing, corrupt or incompatible with the configuration.
    #[error("Failed to load model weights from {path}: {reason}")]
    ModelLoadFailure {
        /// Weights path that was being loaded.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Weights could not be fetched from the remote host.
    #[error("Failed to download {url}: {reason}")]
    Download {
        /// Source URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// Error saving a checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelLoadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
