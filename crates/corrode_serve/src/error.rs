//! Error types for corrode_serve.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use corrode_explain::ExplainError;
use corrode_models::ModelError;
use corrode_vision::VisionError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using [`ServeError`].
pub type Result<T> = std::result::Result<T, ServeError>;

/// Errors surfaced by the prediction service.
#[derive(Error, Debug)]
pub enum ServeError {
    /// The request carried no usable `image` field.
    #[error("{0}")]
    MissingInput(String),

    /// The upload exceeded the configured body limit.
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Image handling failed.
    #[error(transparent)]
    Vision(#[from] VisionError),

    /// Attribution failed.
    #[error(transparent)]
    Explain(#[from] ExplainError),

    /// The classifier could not be loaded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The inference queue is full.
    #[error("Server is busy, try again later")]
    Overloaded,

    /// The request deadline passed before inference finished.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid service configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker failed without producing a result.
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingInput(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Vision(VisionError::DecodeError(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Vision(VisionError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Vision(_)
            | Self::Explain(_)
            | Self::Model(_)
            | Self::InvalidConfig(_)
            | Self::Internal(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body: `{ "error": <message> }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
