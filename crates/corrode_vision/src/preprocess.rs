//! Image decoding and normalization.

use std::io::Cursor;

use burn::prelude::*;
use corrode_core::ImageShape;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

/// Per-channel mean of the ImageNet training set (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the ImageNet training set (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration for the preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Side length of the square classifier input.
    pub size: u32,
    /// Per-channel mean subtracted after scaling to [0, 1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided out after centering.
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            size: ImageShape::PROCESSING.height() as u32,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// A decoded upload together with its classifier input.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// The decoded image at its original resolution.
    pub original: RgbImage,
    /// Normalized channel-first tensor (3, size, size).
    pub tensor: Array3<f32>,
}

impl Preprocessed {
    /// Shape of the normalized tensor.
    pub fn shape(&self) -> ImageShape {
        let (c, h, w) = self.tensor.dim();
        ImageShape::new(c, h, w)
    }

    /// Convert into a burn tensor of shape (1, 3, size, size).
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let data: Vec<f32> = self.tensor.iter().copied().collect();
        Tensor::from_data(TensorData::new(data, self.shape().batched()), device)
    }
}

/// Turns raw upload bytes into classifier input.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    /// Create a preprocessor.
    ///
    /// # Errors
    ///
    /// [`VisionError::InvalidConfig`] for a zero size or a non-positive std.
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(VisionError::InvalidConfig(
                "preprocess size must be positive".to_string(),
            ));
        }
        if config.std.iter().any(|s| s.is_nan() || *s <= 0.0) {
            return Err(VisionError::InvalidConfig(format!(
                "standard deviations must be positive, got {:?}",
                config.std
            )));
        }
        Ok(Self { config })
    }

    /// The preprocessor configuration.
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Decode image bytes in any supported format into an RGB image.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(VisionError::DecodeError("empty image data".to_string()));
        }

        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| VisionError::DecodeError(e.to_string()))?
            .decode()
            .map_err(|e| VisionError::DecodeError(e.to_string()))?;

        Ok(image.to_rgb8())
    }

    /// Decode, resize (without cropping) and normalize.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Preprocessed> {
        let original = self.decode(bytes)?;
        let tensor = self.normalize(&original);
        self.check_shape(&tensor)?;

        tracing::debug!(
            width = original.width(),
            height = original.height(),
            size = self.config.size,
            "Preprocessed image"
        );

        Ok(Preprocessed { original, tensor })
    }

    /// Fail with [`VisionError::CoreError`] unless `tensor` is `(3, size, size)`.
    pub fn check_shape(&self, tensor: &Array3<f32>) -> Result<()> {
        ImageShape::square_rgb(self.config.size as usize).validate(tensor.shape())?;
        Ok(())
    }

    /// Resize `image` to the configured square size and normalize it into a
    /// channel-first tensor.
    pub fn normalize(&self, image: &RgbImage) -> Array3<f32> {
        let size = self.config.size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let side = size as usize;
        let mut tensor = Array3::<f32>::zeros((3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                tensor[[c, y as usize, x as usize]] =
                    (value - self.config.mean[c]) / self.config.std[c];
            }
        }
        tensor
    }
}
