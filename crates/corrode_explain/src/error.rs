//! Error types for corrode_explain.

use corrode_core::TargetLayer;
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing an attribution.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The activation or gradient of the target layer was never captured.
    #[error("Attribution unavailable: {missing} for {layer} was not captured")]
    AttributionUnavailable {
        /// Designated layer.
        layer: TargetLayer,
        /// Which capture did not fire.
        missing: &'static str,
    },

    /// Explicit target class outside the classifier head.
    #[error("Invalid target class {target}: classifier has {n_classes} classes")]
    InvalidTarget {
        /// Requested class.
        target: usize,
        /// Number of classes.
        n_classes: usize,
    },

    /// Input tensor not usable for attribution.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tensor data could not be read back.
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] corrode_core::CoreError),
}
