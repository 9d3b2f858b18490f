//! Activation and gradient capture.
//!
//! Captures live in a [`CaptureScope`] created for a single attribution call
//! and dropped when it returns. Nothing is registered on the classifier, so
//! concurrent calls cannot observe each other's tensors.

use burn::prelude::*;
use corrode_core::TargetLayer;

use crate::error::{ExplainError, Result};

/// Activation and gradient of the designated layer for one attribution call.
#[derive(Debug, Clone)]
pub struct CaptureScope<B: Backend> {
    layer: TargetLayer,
    activation: Option<Tensor<B, 4>>,
    gradient: Option<Tensor<B, 4>>,
}

impl<B: Backend> CaptureScope<B> {
    /// Open an empty scope for `layer`.
    pub fn new(layer: TargetLayer) -> Self {
        Self {
            layer,
            activation: None,
            gradient: None,
        }
    }

    /// The designated layer.
    pub fn layer(&self) -> TargetLayer {
        self.layer
    }

    /// Record the designated layer's forward output, replacing any earlier one.
    pub fn record_activation(&mut self, activation: Tensor<B, 4>) {
        self.activation = Some(activation);
    }

    /// Record the gradient w.r.t. the designated layer's output.
    pub fn record_gradient(&mut self, gradient: Tensor<B, 4>) {
        self.gradient = Some(gradient);
    }

    /// Close the scope, returning the paired `(activation, gradient)`.
    ///
    /// # Errors
    ///
    /// [`ExplainError::AttributionUnavailable`] if either capture is missing.
    pub fn into_pair(self) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let layer = self.layer;
        let activation = self.activation.ok_or(ExplainError::AttributionUnavailable {
            layer,
            missing: "activation",
        })?;
        let gradient = self.gradient.ok_or(ExplainError::AttributionUnavailable {
            layer,
            missing: "gradient",
        })?;
        Ok((activation, gradient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrode_core::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_scope_pairs_captures() {
        let device = Default::default();
        let mut scope = CaptureScope::<TestBackend>::new(TargetLayer::Layer4);
        assert_eq!(scope.layer(), TargetLayer::Layer4);

        scope.record_activation(Tensor::ones([1, 2, 3, 3], &device));
        scope.record_gradient(Tensor::zeros([1, 2, 3, 3], &device));

        let (a, g) = scope.into_pair().unwrap();
        assert_eq!(a.dims(), g.dims());
    }

    #[test]
    fn test_scope_keeps_latest_activation() {
        let device = Default::default();
        let mut scope = CaptureScope::<TestBackend>::new(TargetLayer::Layer3);
        scope.record_activation(Tensor::zeros([1, 2, 3, 3], &device));
        scope.record_activation(Tensor::ones([1, 4, 2, 2], &device));
        scope.record_gradient(Tensor::zeros([1, 4, 2, 2], &device));

        let (a, _) = scope.into_pair().unwrap();
        assert_eq!(a.dims(), [1, 4, 2, 2]);
        let total: f32 = a.sum().into_scalar().elem();
        assert_eq!(total, 16.0);
    }

    #[test]
    fn test_scope_missing_gradient() {
        let device = Default::default();
        let mut scope = CaptureScope::<TestBackend>::new(TargetLayer::Layer2);
        scope.record_activation(Tensor::ones([1, 2, 3, 3], &device));

        let err = scope.into_pair().unwrap_err();
        assert!(matches!(
            err,
            ExplainError::AttributionUnavailable {
                layer: TargetLayer::Layer2,
                missing: "gradient"
            }
        ));
    }

    #[test]
    fn test_scope_missing_activation() {
        let device = Default::default();
        let mut scope = CaptureScope::<TestBackend>::new(TargetLayer::Layer4);
        scope.record_gradient(Tensor::zeros([1, 2, 3, 3], &device));

        assert!(matches!(
            scope.into_pair(),
            Err(ExplainError::AttributionUnavailable {
                missing: "activation",
                ..
            })
        ));
    }
}
