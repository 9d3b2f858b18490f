//! # corrode_models
//!
//! The frozen classifier behind corrode.
//!
//! This crate provides:
//! - [`ResNet`] - ResNet-18 topology with a replaceable linear head and
//!   frozen batch norm, splittable at any residual stage
//! - [`checkpoint`] - saving and loading burn records, full or head-only
//! - [`hub`] - fetching weight files from a remote host

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod error;
pub mod hub;
pub mod resnet;

pub use checkpoint::{load_classifier, save_head, save_model, WeightsLayout, WeightsSpec};
pub use error::{ModelError, Result};
pub use resnet::{BasicBlock, FrozenBatchNorm, ResNet, ResNetConfig};
