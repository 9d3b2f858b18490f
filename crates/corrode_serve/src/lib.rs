//! # corrode_serve
//!
//! HTTP prediction service for corrode.
//!
//! This crate provides:
//! - [`Pipeline`] - preprocess, classify, attribute, composite and store
//! - [`InferencePool`] - bounded pool of blocking inference workers
//! - [`router`] - the axum routes (`/predict`, `/heatmap/:filename`, `/health`)
//! - [`ServiceConfig`] and the clap arguments it is built from

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod error;
mod pipeline;
mod pool;
mod routes;
pub mod service;

pub use config::{ModelArgs, ServeArgs, ServiceConfig};
pub use error::{ErrorBody, Result, ServeError};
pub use pipeline::{Pipeline, PredictResponse, Prediction};
pub use pool::{InferencePool, PoolConfig};
pub use routes::{router, AppState, HealthResponse, RouterOptions, IMAGE_FIELD};

/// Backend the service runs on: CPU tensors with gradient tracking.
pub type ServeBackend = burn_autodiff::Autodiff<burn_ndarray::NdArray>;
