//! # corrode_vision
//!
//! Image-side processing for corrode.
//!
//! This crate provides:
//! - [`Preprocessor`] - decode, resize and normalize uploads into classifier input
//! - [`colormap`] - the jet palette used to render importance
//! - [`Compositor`] - threshold, colorize and blend importance over the image
//! - [`HeatmapStore`] - persist composites, serve them back, expire old ones

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod colormap;
mod composite;
mod error;
mod preprocess;
mod store;

pub use composite::{Compositor, CompositorConfig, Threshold};
pub use error::{Result, VisionError};
pub use preprocess::{PreprocessConfig, Preprocessed, Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
pub use store::{HeatmapRef, HeatmapStore, RetentionPolicy, SweepReport};
