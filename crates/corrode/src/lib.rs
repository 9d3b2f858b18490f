//! # corrode
//!
//! Corrosion-level classification with class-activation heatmaps.
//!
//! corrode loads a fine-tuned ResNet-18 once, accepts an uploaded photo, and
//! answers with a corrosion level (5 to 9) plus a heatmap showing which
//! regions drove the decision:
//!
//! - **Core**: shapes, levels, target layers, importance maps
//! - **Models**: the frozen classifier and its weight files
//! - **Explain**: request-scoped class-activation attribution
//! - **Vision**: preprocessing, jet compositing, heatmap storage
//! - **Serve**: the HTTP service and its worker pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corrode::prelude::*;
//! use std::sync::Arc;
//!
//! let device = Default::default();
//! let model = load_classifier::<ServeBackend>(
//!     &ResNetConfig::resnet18(N_CLASSES),
//!     &WeightsSpec::full("final_corrosion_model.mpk"),
//!     &device,
//! )?;
//!
//! let store = Arc::new(HeatmapStore::create("/tmp/heatmaps", RetentionPolicy::keep_all())?);
//! let pipeline = Pipeline::new(
//!     model,
//!     device,
//!     AttributionConfig::default(),
//!     CompositorConfig::default(),
//!     store,
//! )?;
//!
//! let prediction = pipeline.run(&std::fs::read("pipe.jpg")?)?;
//! println!("level {} -> {}", prediction.level, prediction.heatmap.url());
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use corrode_core as core;
pub use corrode_explain as explain;
pub use corrode_models as models;
pub use corrode_serve as serve;
pub use corrode_vision as vision;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use corrode::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use corrode_core::{
        CamClassifier, CorrosionLevel, ImageShape, ImportanceMap, LevelLabel, TargetLayer,
        N_CLASSES,
    };

    // Models
    pub use corrode_models::{load_classifier, ResNet, ResNetConfig, WeightsLayout, WeightsSpec};

    // Explain
    pub use corrode_explain::{Attribution, AttributionConfig, AttributionEngine, ChannelWeighting};

    // Vision
    pub use corrode_vision::{
        Compositor, CompositorConfig, HeatmapStore, Preprocessor, RetentionPolicy, Threshold,
    };

    // Serve
    pub use corrode_serve::{Pipeline, Prediction, ServeBackend, ServiceConfig};
}
