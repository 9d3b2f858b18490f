//! The attribution engine.
//!
//! One call to [`AttributionEngine::attribute`] runs a forward pass up to the
//! designated layer, detaches that layer's output into a fresh
//! gradient-tracked leaf, finishes the forward pass from it, and seeds the
//! backward pass from the target class score alone. The leaf's gradient is
//! exactly ∂score/∂activation, and both tensors belong to the call's
//! [`CaptureScope`].

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use corrode_core::{CamClassifier, ImportanceMap, TargetLayer};
use serde::{Deserialize, Serialize};

use crate::activation::CaptureScope;
use crate::attribution::{argmax, weighted_cam, ChannelWeighting};
use crate::error::{ExplainError, Result};

/// Configuration for the attribution engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// Layer whose activations and gradients are combined.
    pub layer: TargetLayer,
    /// Channel weighting scheme.
    pub weighting: ChannelWeighting,
}

impl AttributionConfig {
    /// Set the target layer.
    #[must_use]
    pub fn with_layer(mut self, layer: TargetLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Set the channel weighting.
    #[must_use]
    pub fn with_weighting(mut self, weighting: ChannelWeighting) -> Self {
        self.weighting = weighting;
        self
    }
}

/// Result of one attribution call.
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Normalized importance over the target layer's spatial grid.
    pub importance: ImportanceMap,
    /// Class the map explains.
    pub target_class: usize,
    /// Class scores (logits) from the forward pass.
    pub scores: Vec<f32>,
    /// Layer the map was computed at.
    pub layer: TargetLayer,
    /// Channel weighting used.
    pub weighting: ChannelWeighting,
}

/// Computes class-activation importance maps for a classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributionEngine {
    config: AttributionConfig,
}

impl AttributionEngine {
    /// Create an engine.
    pub fn new(config: AttributionConfig) -> Self {
        Self { config }
    }

    /// The engine configuration.
    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// Attribute the classifier's decision for `input`.
    ///
    /// # Arguments
    ///
    /// * `model` - Frozen classifier
    /// * `input` - Preprocessed image of shape (1, 3, h, w)
    /// * `target` - Class to explain; the top-scoring class when `None`
    ///
    /// # Errors
    ///
    /// - [`ExplainError::InvalidInput`] when the batch size is not one
    /// - [`ExplainError::InvalidTarget`] when `target` is out of range
    /// - [`ExplainError::AttributionUnavailable`] when the designated layer
    ///   produced no activation or the score has no gradient w.r.t. it
    pub fn attribute<B, M>(
        &self,
        model: &M,
        input: Tensor<B, 4>,
        target: Option<usize>,
    ) -> Result<Attribution>
    where
        B: AutodiffBackend,
        M: CamClassifier<B>,
    {
        let [batch, _, _, _] = input.dims();
        if batch != 1 {
            return Err(ExplainError::InvalidInput(format!(
                "attribution needs a batch of one image, got {batch}"
            )));
        }

        let layer = self.config.layer;
        let mut scope = CaptureScope::<B::InnerBackend>::new(layer);

        // Forward to the designated layer, then restart the graph from its output
        let features = model.forward_features(input, layer).map(|features| {
            let leaf = features.detach().require_grad();
            scope.record_activation(leaf.clone().inner());
            leaf
        });
        let Some(features) = features else {
            return Err(ExplainError::AttributionUnavailable {
                layer,
                missing: "activation",
            });
        };

        let logits = model.forward_head(features.clone(), layer);
        let scores: Vec<f32> = logits
            .clone()
            .inner()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ExplainError::Tensor(format!("{e:?}")))?;

        let n_classes = scores.len();
        let target_class = match target {
            Some(t) if t >= n_classes => {
                return Err(ExplainError::InvalidTarget {
                    target: t,
                    n_classes,
                })
            }
            Some(t) => t,
            None => argmax(&scores).ok_or_else(|| {
                ExplainError::InvalidInput("classifier produced no finite scores".to_string())
            })?,
        };

        // Seed the backward pass from the target score only
        let score = logits.slice([0..1, target_class..target_class + 1]).sum();
        let grads = score.backward();
        if let Some(gradient) = features.grad(&grads) {
            scope.record_gradient(gradient);
        }

        let (activation, gradient) = scope.into_pair()?;
        let [_, channels, height, width] = activation.dims();
        let activation = activation.reshape([channels, height, width]);
        let gradient = gradient.reshape([channels, height, width]);

        let importance = weighted_cam(activation, gradient, self.config.weighting)
            .with_target_class(target_class)
            .normalize()
            .to_importance()?;

        tracing::debug!(
            layer = %layer,
            target_class,
            grid = ?[height, width],
            "Computed attribution"
        );

        Ok(Attribution {
            importance,
            target_class,
            scores,
            layer,
            weighting: self.config.weighting,
        })
    }
}
