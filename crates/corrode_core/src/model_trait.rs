//! Classifier trait used by the attribution engine.
//!
//! Defines the seam between a concrete network and class-activation
//! attribution: the network must be able to stop at a designated layer and to
//! resume from that layer's output.

use burn::prelude::*;

use crate::TargetLayer;

/// Image classifier that can be split at an internal feature layer.
///
/// `forward_head(forward_features(x, l), l)` must equal `forward(x)` for
/// every layer `l` the model supports.
pub trait CamClassifier<B: Backend>: Module<B> + Clone + Send {
    /// Number of class scores produced.
    fn n_classes(&self) -> usize;

    /// Run the network up to and including `layer`.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, 3, height, width)
    ///
    /// # Returns
    ///
    /// The layer output of shape (batch, channels, h, w), or `None` if the
    /// model has no such layer.
    fn forward_features(&self, x: Tensor<B, 4>, layer: TargetLayer) -> Option<Tensor<B, 4>>;

    /// Run the rest of the network starting from the output of `layer`.
    ///
    /// # Returns
    ///
    /// Logits tensor of shape (batch, n_classes)
    fn forward_head(&self, features: Tensor<B, 4>, layer: TargetLayer) -> Tensor<B, 2>;

    /// Full forward pass returning logits.
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2>;
}
