//! # corrode_explain
//!
//! Class-activation attribution for corrode.
//!
//! This crate provides:
//! - Request-scoped activation and gradient capture
//! - Channel weighting and normalized attribution maps
//! - [`AttributionEngine`], which runs the forward and backward passes and
//!   turns them into an [`ImportanceMap`](corrode_core::ImportanceMap)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod attribution;
mod engine;
mod error;

pub use activation::CaptureScope;
pub use attribution::{argmax, channel_weights, weighted_cam, AttributionMap, ChannelWeighting};
pub use engine::{Attribution, AttributionConfig, AttributionEngine};
pub use error::{ExplainError, Result};
