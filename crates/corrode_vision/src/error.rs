//! Error types for corrode_vision.

use thiserror::Error;

/// Result type alias using [`VisionError`].
pub type Result<T> = std::result::Result<T, VisionError>;

/// Errors that can occur while handling images and heatmap files.
#[derive(Error, Debug)]
pub enum VisionError {
    /// Image bytes could not be decoded.
    #[error("Could not decode image: {0}")]
    DecodeError(String),

    /// Image could not be encoded.
    #[error("Could not encode image: {0}")]
    Encode(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Heatmap not present in the store.
    #[error("Heatmap not found: {0}")]
    NotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] corrode_core::CoreError),
}
