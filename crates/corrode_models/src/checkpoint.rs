//! Model checkpointing and weight loading.
//!
//! Weights are stored with Burn's named MessagePack recorder (`*.mpk`). Two
//! layouts are supported:
//!
//! - **Full**: the whole network in one record
//! - **Head only**: just the fine-tuned linear head, applied on top of a
//!   separately stored backbone record
//!
//! # Example
//!
//! ```rust,ignore
//! use corrode_models::{load_classifier, ResNetConfig, WeightsSpec};
//!
//! let spec = WeightsSpec::full("final_corrosion_model.mpk")
//!     .with_url("https://example.com/final_corrosion_model.mpk");
//! let model = load_classifier::<MyBackend>(&ResNetConfig::default(), &spec, &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::hub;
use crate::resnet::{ResNet, ResNetConfig};

/// File extension used by the recorder.
pub const WEIGHTS_EXTENSION: &str = "mpk";

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Path the recorder actually reads and writes for `path`.
pub fn record_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension(WEIGHTS_EXTENSION)
}

/// What a weights file contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "layout")]
pub enum WeightsLayout {
    /// The whole network.
    Full,
    /// Only the linear head; the rest comes from `backbone`.
    HeadOnly {
        /// Full-network record providing the pretrained backbone.
        backbone: PathBuf,
    },
}

/// Where the classifier weights live and how to obtain them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsSpec {
    /// Local weights file.
    pub path: PathBuf,
    /// Remote location to download from when `path` is absent.
    pub url: Option<String>,
    /// Record layout.
    pub layout: WeightsLayout,
}

impl WeightsSpec {
    /// Full-network weights at `path`.
    pub fn full(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
            layout: WeightsLayout::Full,
        }
    }

    /// Head-only weights at `path` over the backbone record at `backbone`.
    pub fn head_only(path: impl Into<PathBuf>, backbone: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
            layout: WeightsLayout::HeadOnly {
                backbone: backbone.into(),
            },
        }
    }

    /// Set the download URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Save a whole model to a checkpoint file.
pub fn save_model<B: Backend, M: Module<B>>(model: &M, path: impl AsRef<Path>) -> Result<()> {
    model
        .clone()
        .save_file(path.as_ref().to_path_buf(), &recorder())
        .map_err(|e| ModelError::Save(e.to_string()))
}

/// Save only the classification head of `model`.
pub fn save_head<B: Backend>(model: &ResNet<B>, path: impl AsRef<Path>) -> Result<()> {
    save_model::<B, Linear<B>>(model.fc(), path)
}

/// Load `model`'s parameters from the checkpoint at `path`.
pub fn load_into<B: Backend, M: Module<B>>(
    model: M,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<M> {
    let path = record_path(path);
    if !path.exists() {
        return Err(ModelError::load(&path, "file not found"));
    }
    model
        .load_file(path.clone(), &recorder(), device)
        .map_err(|e| ModelError::load(&path, e))
}

/// Build the classifier described by `config` and load weights per `spec`.
///
/// Downloads the weights first when they are missing locally and a URL is
/// configured. The returned model is frozen: parameters no longer track
/// gradients.
pub fn load_classifier<B: Backend>(
    config: &ResNetConfig,
    spec: &WeightsSpec,
    device: &B::Device,
) -> Result<ResNet<B>> {
    let path = hub::ensure_weights(&spec.path, spec.url.as_deref())?;
    let model = config.init::<B>(device);

    let model = match &spec.layout {
        WeightsLayout::Full => load_into(model, &path, device)?,
        WeightsLayout::HeadOnly { backbone } => {
            let model = load_into(model, backbone, device)?;
            let head = LinearConfig::new(config.feature_channels(), config.n_classes).init(device);
            let head = load_into(head, &path, device)?;
            model.with_fc(head)
        }
    };

    tracing::info!(
        path = %path.display(),
        layout = ?spec.layout,
        n_classes = config.n_classes,
        "Loaded classifier weights"
    );

    Ok(model.no_grad())
}
