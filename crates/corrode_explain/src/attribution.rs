//! Attribution map computation.

use burn::prelude::*;
use corrode_core::ImportanceMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// How per-channel weights are derived from the gradient map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelWeighting {
    /// Spatial mean of the absolute gradient.
    #[default]
    MeanAbsGradient,
    /// Spatial mean of the raw gradient (plain Grad-CAM).
    MeanGradient,
}

/// Per-channel weights of shape (channels, 1, 1).
///
/// # Arguments
///
/// * `gradients` - Gradient of the class score w.r.t. activations (channels, h, w)
pub fn channel_weights<B: Backend>(
    gradients: Tensor<B, 3>,
    weighting: ChannelWeighting,
) -> Tensor<B, 3> {
    let gradients = match weighting {
        ChannelWeighting::MeanAbsGradient => gradients.abs(),
        ChannelWeighting::MeanGradient => gradients,
    };

    // (channels, h, w) -> (channels, h, 1) -> (channels, 1, 1)
    gradients.mean_dim(2).mean_dim(1)
}

/// Compute the rectified class-activation map.
///
/// # Arguments
///
/// * `activations` - Target layer output (channels, h, w)
/// * `gradients` - Gradients w.r.t. activations (channels, h, w)
///
/// # Returns
///
/// Attribution map of shape (h, w), negative values clipped to zero.
pub fn weighted_cam<B: Backend>(
    activations: Tensor<B, 3>,
    gradients: Tensor<B, 3>,
    weighting: ChannelWeighting,
) -> AttributionMap<B> {
    let [_, height, width] = activations.dims();
    let weights = channel_weights(gradients, weighting);

    // (channels, h, w) * (channels, 1, 1) summed over channels -> (1, h, w)
    let cam = (activations * weights).sum_dim(0).reshape([height, width]);

    AttributionMap::new(cam.clamp_min(0.0), weighting)
}

/// Attribution over the spatial grid of the target layer.
#[derive(Debug, Clone)]
pub struct AttributionMap<B: Backend> {
    /// The attribution values (h, w).
    pub values: Tensor<B, 2>,
    /// Weighting used to produce the values.
    pub weighting: ChannelWeighting,
    /// Target class.
    pub target_class: Option<usize>,
}

impl<B: Backend> AttributionMap<B> {
    /// Create a new attribution map.
    pub fn new(values: Tensor<B, 2>, weighting: ChannelWeighting) -> Self {
        Self {
            values,
            weighting,
            target_class: None,
        }
    }

    /// Set the target class.
    pub fn with_target_class(mut self, class: usize) -> Self {
        self.target_class = Some(class);
        self
    }

    /// Shape `[h, w]`.
    pub fn shape(&self) -> [usize; 2] {
        self.values.dims()
    }

    /// Rescale to [0, 1] via `(v - min) / (max - min)`.
    ///
    /// A uniform map (including all zeros) has no range to rescale and
    /// becomes all zeros.
    pub fn normalize(&self) -> Self {
        let min_val: f32 = self.values.clone().min().into_scalar().elem();
        let max_val: f32 = self.values.clone().max().into_scalar().elem();
        let range = max_val - min_val;

        let normalized = if range > 0.0 && range.is_finite() {
            (self.values.clone() - min_val) / range
        } else {
            Tensor::zeros(self.values.dims(), &self.values.device())
        };

        Self {
            values: normalized,
            weighting: self.weighting,
            target_class: self.target_class,
        }
    }

    /// Read the values back into an [`ImportanceMap`].
    ///
    /// Call on a normalized map; values are clamped into [0, 1] to absorb
    /// rounding at the ends of the range.
    pub fn to_importance(&self) -> Result<ImportanceMap> {
        let [height, width] = self.shape();
        let values: Vec<f32> = self
            .values
            .clone()
            .clamp(0.0, 1.0)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ExplainError::Tensor(format!("{e:?}")))?;

        let values = Array2::from_shape_vec((height, width), values)
            .map_err(|e| ExplainError::Tensor(e.to_string()))?;
        Ok(ImportanceMap::new(values)?)
    }
}

/// Index of the largest score; the first one wins ties. `None` when empty or
/// when every score is NaN.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrode_core::backend::NdArray;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    fn tensor3(data: Vec<f32>, shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::from_data(TensorData::new(data, shape), &Default::default())
    }

    fn values(map: &AttributionMap<TestBackend>) -> Vec<f32> {
        map.values.clone().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_channel_weights_mean_abs() {
        // Channel 0: gradients {1, -3} -> 2; channel 1: {-2, -2} -> 2 (abs) / -2 (raw)
        let g = tensor3(vec![1.0, -3.0, -2.0, -2.0], [2, 1, 2]);

        let abs: Vec<f32> = channel_weights(g.clone(), ChannelWeighting::MeanAbsGradient)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(abs, vec![2.0, 2.0]);

        let raw: Vec<f32> = channel_weights(g, ChannelWeighting::MeanGradient)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(raw, vec![-1.0, -2.0]);
    }

    #[test]
    fn test_weighted_cam_sums_channels() {
        // Two channels over a 1x2 grid
        let a = tensor3(vec![1.0, 2.0, 3.0, -10.0], [2, 1, 2]);
        let g = tensor3(vec![1.0, 1.0, 2.0, 2.0], [2, 1, 2]);

        let cam = weighted_cam(a, g, ChannelWeighting::MeanAbsGradient);
        assert_eq!(cam.shape(), [1, 2]);
        // [1*1 + 3*2, 2*1 - 10*2] = [7, -18] -> rectified [7, 0]
        assert_eq!(values(&cam), vec![7.0, 0.0]);
    }

    #[test]
    fn test_normalize_all_zero_is_zero() {
        let device = Default::default();
        let map = AttributionMap::<TestBackend>::new(
            Tensor::zeros([7, 7], &device),
            ChannelWeighting::default(),
        );
        let normalized = map.normalize();
        assert!(values(&normalized).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalize_uniform_is_zero() {
        let device = Default::default();
        let map = AttributionMap::<TestBackend>::new(
            Tensor::ones([4, 4], &device) * 3.5,
            ChannelWeighting::default(),
        );
        let out = values(&map.normalize());
        assert!(out.iter().all(|v| *v == 0.0 && v.is_finite()));
    }

    #[test]
    fn test_uniform_activations_give_zero_importance() {
        let a = tensor3(vec![2.0; 3 * 5 * 5], [3, 5, 5]);
        let g = tensor3(vec![0.5; 3 * 5 * 5], [3, 5, 5]);

        let importance = weighted_cam(a, g, ChannelWeighting::MeanAbsGradient)
            .normalize()
            .to_importance()
            .unwrap();
        assert!(importance.is_zero());
    }

    #[test]
    fn test_normalize_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..10 {
            let a: Vec<f32> = (0..4 * 6 * 6).map(|_| rng.gen_range(-1.0..2.0)).collect();
            let g: Vec<f32> = (0..4 * 6 * 6).map(|_| rng.gen_range(-1.0..1.0)).collect();

            let map = weighted_cam(
                tensor3(a, [4, 6, 6]),
                tensor3(g, [4, 6, 6]),
                ChannelWeighting::MeanAbsGradient,
            )
            .normalize();
            let out = values(&map);

            let min = out.iter().copied().fold(f32::INFINITY, f32::min);
            let max = out.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            assert!(min >= -1e-6 && max <= 1.0 + 1e-6);
            assert!(out.iter().all(|v| v.is_finite()));
            assert!(map.to_importance().is_ok());
        }
    }

    #[test]
    fn test_with_target_class() {
        let device = Default::default();
        let map = AttributionMap::<TestBackend>::new(
            Tensor::zeros([2, 2], &device),
            ChannelWeighting::MeanGradient,
        )
        .with_target_class(3);
        assert_eq!(map.target_class, Some(3));
        assert_eq!(map.normalize().target_class, Some(3));
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.9, 0.2, 0.05, 0.3]), Some(1));
        assert_eq!(argmax(&[1.0, 1.0]), Some(0));
        assert_eq!(argmax(&[f32::NAN, -1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_channel_weighting_serde() {
        let json = serde_json::to_string(&ChannelWeighting::MeanAbsGradient).unwrap();
        assert_eq!(json, "\"mean_abs_gradient\"");
        let back: ChannelWeighting = serde_json::from_str("\"mean_gradient\"").unwrap();
        assert_eq!(back, ChannelWeighting::MeanGradient);
    }
}
