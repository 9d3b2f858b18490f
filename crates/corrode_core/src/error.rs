//! Error types for corrode_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in corrode_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Dimension error.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// Unknown target layer name.
    #[error("Unknown target layer '{0}' (expected layer1, layer2, layer3 or layer4)")]
    UnknownLayer(String),

    /// Importance values outside [0, 1] or not finite.
    #[error("Invalid importance map: {0}")]
    InvalidImportance(String),
}
