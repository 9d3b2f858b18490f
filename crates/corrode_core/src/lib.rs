//! # corrode_core
//!
//! Core types and traits for corrode, a corrosion-level classifier that
//! explains its predictions with class-activation heatmaps.
//!
//! This crate provides:
//! - [`ImageShape`] for channel-first image tensor metadata
//! - [`CorrosionLevel`] and the class-index mapping
//! - [`TargetLayer`] to designate the feature layer used for attribution
//! - [`ImportanceMap`], the normalized spatial attribution
//! - [`CamClassifier`], the seam between models and the attribution engine
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image tensors follow the convention `(B, C, H, W)`:
//! - `B`: Batch size (always 1 for attribution)
//! - `C`: Color channels (RGB)
//! - `H`, `W`: Spatial resolution (224×224 for the classifier)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod importance;
mod layer;
mod level;
mod model_trait;
mod shape;

pub use error::{CoreError, Result};
pub use importance::ImportanceMap;
pub use layer::TargetLayer;
pub use level::{CorrosionLevel, LevelLabel, LEVEL_OFFSET, N_CLASSES};
pub use model_trait::CamClassifier;
pub use shape::ImageShape;

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// CPU backend with gradient tracking, used for attribution.
    #[cfg(feature = "backend-ndarray")]
    pub type CamBackend = Autodiff<NdArray>;
}
