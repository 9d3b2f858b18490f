//! The prediction pipeline: decode, classify, attribute, render, store.

use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use corrode_core::{CamClassifier, ImportanceMap, LevelLabel};
use corrode_explain::{AttributionConfig, AttributionEngine};
use corrode_vision::{
    Compositor, CompositorConfig, HeatmapRef, HeatmapStore, PreprocessConfig, Preprocessor,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of one prediction.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Top-scoring class index.
    pub class_index: usize,
    /// Corrosion level for the class, or "Unknown".
    pub level: LevelLabel,
    /// Raw class scores.
    pub scores: Vec<f32>,
    /// Importance over the target layer's grid.
    pub importance: ImportanceMap,
    /// The stored composite.
    pub heatmap: HeatmapRef,
}

/// Response body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Predicted level: an integer, or the string "Unknown".
    pub predicted_corrosion_level: LevelLabel,
    /// Where the heatmap can be fetched.
    pub heatmap_url: String,
    /// Always "returned".
    pub status: String,
}

impl From<&Prediction> for PredictResponse {
    fn from(prediction: &Prediction) -> Self {
        Self {
            predicted_corrosion_level: prediction.level.clone(),
            heatmap_url: prediction.heatmap.url(),
            status: "returned".to_string(),
        }
    }
}

/// Everything needed to turn upload bytes into a [`Prediction`].
///
/// Cheap to clone; each inference worker owns its own copy of the model.
pub struct Pipeline<B: AutodiffBackend, M: CamClassifier<B>> {
    model: M,
    device: B::Device,
    preprocessor: Preprocessor,
    engine: AttributionEngine,
    compositor: Compositor,
    store: Arc<HeatmapStore>,
}

impl<B: AutodiffBackend, M: CamClassifier<B>> Clone for Pipeline<B, M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            device: self.device.clone(),
            preprocessor: self.preprocessor.clone(),
            engine: self.engine,
            compositor: self.compositor.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<B: AutodiffBackend, M: CamClassifier<B>> Pipeline<B, M> {
    /// Assemble a pipeline around a loaded, frozen model.
    pub fn new(
        model: M,
        device: B::Device,
        attribution: AttributionConfig,
        compositor: CompositorConfig,
        store: Arc<HeatmapStore>,
    ) -> Result<Self> {
        Ok(Self {
            model,
            device,
            preprocessor: Preprocessor::new(PreprocessConfig::default())?,
            engine: AttributionEngine::new(attribution),
            compositor: Compositor::new(compositor)?,
            store,
        })
    }

    /// The heatmap store.
    pub fn store(&self) -> &Arc<HeatmapStore> {
        &self.store
    }

    /// Run the full pipeline on raw image bytes.
    ///
    /// The forward pass that produces the scores is the same one the
    /// attribution is computed from.
    pub fn run(&self, bytes: &[u8]) -> Result<Prediction> {
        let start = Instant::now();

        let preprocessed = self.preprocessor.preprocess(bytes)?;
        let input = preprocessed.to_tensor::<B>(&self.device);

        let attribution = self.engine.attribute(&self.model, input, None)?;
        let class_index = attribution.target_class;
        let level = LevelLabel::for_class_index(class_index);

        let composite = self
            .compositor
            .composite(&preprocessed.original, &attribution.importance);
        let heatmap = self.store.save(&composite)?;

        tracing::info!(
            class_index,
            level = %level,
            heatmap = %heatmap.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Prediction complete"
        );

        Ok(Prediction {
            class_index,
            level,
            scores: attribution.scores,
            importance: attribution.importance,
            heatmap,
        })
    }
}
