//! HTTP routes.

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use corrode_vision::HeatmapStore;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{Result, ServeError};
use crate::pipeline::PredictResponse;
use crate::pool::InferencePool;

/// Multipart field carrying the upload.
pub const IMAGE_FIELD: &str = "image";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pool: Arc<InferencePool>,
    store: Arc<HeatmapStore>,
}

impl AppState {
    /// Bundle the worker pool and the heatmap store.
    pub fn new(pool: Arc<InferencePool>, store: Arc<HeatmapStore>) -> Self {
        Self { pool, store }
    }
}

/// Router options.
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    /// Upload body limit in bytes.
    pub max_upload_bytes: usize,
    /// Attach permissive CORS headers.
    pub cors: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok".
    pub status: String,
}

/// Build the service router.
pub fn router(state: AppState, options: RouterOptions) -> Router {
    let router = Router::new()
        .route("/predict", post(predict))
        .route("/heatmap/:filename", get(heatmap))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if options.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn predict(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>> {
    let mut multipart = multipart.map_err(|e| {
        ServeError::MissingInput(format!("Expected a multipart upload: {}", e.body_text()))
    })?;

    let bytes = read_image_field(&mut multipart).await?;
    tracing::debug!(bytes = bytes.len(), "Received upload");

    let prediction = state.pool.submit(bytes).await?;
    Ok(Json(PredictResponse::from(&prediction)))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() == Some(IMAGE_FIELD) {
            let data = field.bytes().await.map_err(upload_error)?;
            return Ok(data.to_vec());
        }
    }
    Err(ServeError::MissingInput("No image uploaded".to_string()))
}

fn upload_error(e: MultipartError) -> ServeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServeError::PayloadTooLarge(e.body_text())
    } else {
        ServeError::MissingInput(e.body_text())
    }
}

async fn heatmap(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse> {
    let store = Arc::clone(&state.store);
    let bytes = tokio::task::spawn_blocking(move || store.read(&filename))
        .await
        .map_err(|e| ServeError::Internal(e.to_string()))??;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
