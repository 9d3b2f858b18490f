//! Heatmap compositing.
//!
//! An importance map lives on the coarse spatial grid of the target layer.
//! Compositing upsamples it to the output size, colorizes it with the jet
//! palette and blends it over the resized original:
//!
//! ```text
//! out = clamp(round(original * beta + heat * alpha), 0, 255)
//! ```

use corrode_core::ImportanceMap;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::colormap::jet_lut;
use crate::error::{Result, VisionError};

/// Optional suppression of low importance before colorizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "cutoff")]
pub enum Threshold {
    /// Keep every value.
    #[default]
    Off,
    /// Zero values strictly below the cutoff.
    Cutoff(f32),
}

impl Threshold {
    /// Apply to an importance map.
    pub fn apply(&self, map: &ImportanceMap) -> ImportanceMap {
        match *self {
            Threshold::Off => map.clone(),
            Threshold::Cutoff(cutoff) => map.thresholded(cutoff),
        }
    }
}

/// Compositor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Side length of the square output image.
    pub size: u32,
    /// Threshold applied before colorizing.
    pub threshold: Threshold,
    /// Weight of the colorized heatmap.
    pub alpha: f32,
    /// Weight of the original image.
    pub beta: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            size: 224,
            threshold: Threshold::Off,
            alpha: 0.4,
            beta: 1.0,
        }
    }
}

/// Renders importance maps over images.
#[derive(Debug, Clone)]
pub struct Compositor {
    config: CompositorConfig,
    lut: [Rgb<u8>; 256],
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            config: CompositorConfig::default(),
            lut: jet_lut(),
        }
    }
}

impl Compositor {
    /// Create a compositor.
    ///
    /// # Errors
    ///
    /// [`VisionError::InvalidConfig`] if the size is zero, a blend weight is
    /// negative or not finite, or the threshold cutoff lies outside `[0, 1]`.
    pub fn new(config: CompositorConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(VisionError::InvalidConfig(
                "composite size must be positive".to_string(),
            ));
        }
        for (name, w) in [("alpha", config.alpha), ("beta", config.beta)] {
            if !w.is_finite() || w < 0.0 {
                return Err(VisionError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {w}"
                )));
            }
        }
        if let Threshold::Cutoff(cutoff) = config.threshold {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(VisionError::InvalidConfig(format!(
                    "threshold must be within [0, 1], got {cutoff}"
                )));
            }
        }

        Ok(Self {
            config,
            lut: jet_lut(),
        })
    }

    /// The compositor configuration.
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Threshold, upsample and colorize `map` into a `size x size` heat image.
    pub fn colorize(&self, map: &ImportanceMap) -> RgbImage {
        let map = self.config.threshold.apply(map);
        let upsampled = self.upsample(&map);

        RgbImage::from_fn(self.config.size, self.config.size, |x, y| {
            // Truncation matches the 8-bit quantization of the palette input.
            let level = (upsampled.get_pixel(x, y)[0].clamp(0.0, 1.0) * 255.0) as u8;
            self.lut[level as usize]
        })
    }

    /// Blend the colorized `map` over `original`. The output is always
    /// `size x size`; the original is resized without cropping.
    pub fn composite(&self, original: &RgbImage, map: &ImportanceMap) -> RgbImage {
        let size = self.config.size;
        let heat = self.colorize(map);
        let base = imageops::resize(original, size, size, FilterType::Triangle);

        let (alpha, beta) = (self.config.alpha, self.config.beta);
        RgbImage::from_fn(size, size, |x, y| {
            let o = base.get_pixel(x, y);
            let h = heat.get_pixel(x, y);
            Rgb(std::array::from_fn(|c| {
                let v = f32::from(o[c]) * beta + f32::from(h[c]) * alpha;
                v.round().clamp(0.0, 255.0) as u8
            }))
        })
    }

    fn upsample(&self, map: &ImportanceMap) -> ImageBuffer<Luma<f32>, Vec<f32>> {
        let size = self.config.size;
        let (h, w) = (map.height() as u32, map.width() as u32);
        if h == 0 || w == 0 {
            return ImageBuffer::new(size, size);
        }

        let values = map.values();
        let grid = ImageBuffer::from_fn(w, h, |x, y| Luma([values[[y as usize, x as usize]]]));
        imageops::resize(&grid, size, size, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn random_map(h: usize, w: usize, seed: u64) -> ImportanceMap {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values = Array2::from_shape_fn((h, w), |_| rng.gen_range(0.0..=1.0f32));
        ImportanceMap::new(values).unwrap()
    }

    fn lowest_jet() -> Rgb<u8> {
        crate::colormap::jet(0)
    }

    #[test]
    fn test_output_dimensions() {
        let compositor = Compositor::default();
        for (w, h) in [(640, 480), (10, 300), (224, 224)] {
            let original = RgbImage::from_pixel(w, h, Rgb([90, 90, 90]));
            let out = compositor.composite(&original, &random_map(7, 7, 1));
            assert_eq!(out.dimensions(), (224, 224));
        }
    }

    #[test]
    fn test_zero_map_is_uniform_blue_tint() {
        let compositor = Compositor::default();
        let original = RgbImage::from_pixel(50, 50, Rgb([100, 100, 100]));
        let out = compositor.composite(&original, &ImportanceMap::zeros(7, 7));

        // 100 + 0.4 * (0, 0, 128) -> (100, 100, 151)
        assert!(out.pixels().all(|p| *p == Rgb([100, 100, 151])));
    }

    #[test]
    fn test_blend_saturates() {
        let compositor = Compositor::default();
        let white = RgbImage::from_pixel(30, 30, Rgb([255, 255, 255]));
        let ones = ImportanceMap::new(Array2::from_elem((7, 7), 1.0)).unwrap();

        let out = compositor.composite(&white, &ones);
        assert!(out.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_threshold_suppresses_low_values() {
        let cutoff = 0.5;
        let compositor = Compositor::new(CompositorConfig {
            threshold: Threshold::Cutoff(cutoff),
            ..Default::default()
        })
        .unwrap();

        // Uniform maps survive upsampling unchanged.
        let low = ImportanceMap::new(Array2::from_elem((7, 7), 0.3)).unwrap();
        let heat = compositor.colorize(&low);
        assert!(heat.pixels().all(|p| *p == lowest_jet()));

        let high = ImportanceMap::new(Array2::from_elem((7, 7), 0.8)).unwrap();
        let heat = compositor.colorize(&high);
        assert!(heat.pixels().all(|p| *p != lowest_jet()));
    }

    #[test]
    fn test_threshold_off_keeps_values() {
        let compositor = Compositor::default();
        let low = ImportanceMap::new(Array2::from_elem((7, 7), 0.3)).unwrap();
        let heat = compositor.colorize(&low);
        assert!(heat.pixels().all(|p| *p != lowest_jet()));
    }

    #[test]
    fn test_invalid_config() {
        let bad_threshold = CompositorConfig {
            threshold: Threshold::Cutoff(1.5),
            ..Default::default()
        };
        assert!(matches!(
            Compositor::new(bad_threshold),
            Err(VisionError::InvalidConfig(_))
        ));

        let bad_alpha = CompositorConfig {
            alpha: f32::NAN,
            ..Default::default()
        };
        assert!(Compositor::new(bad_alpha).is_err());
    }

    #[test]
    fn test_threshold_serde() {
        let json = serde_json::to_string(&Threshold::Cutoff(0.25)).unwrap();
        let back: Threshold = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Threshold::Cutoff(0.25));

        let off: Threshold = serde_json::from_str(r#"{"mode":"off"}"#).unwrap();
        assert_eq!(off, Threshold::Off);
    }
}
