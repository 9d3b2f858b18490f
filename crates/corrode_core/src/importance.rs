//! Normalized spatial importance maps.

use ndarray::Array2;

use crate::error::{CoreError, Result};

/// A single-channel `(H, W)` importance map with every value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array2<f32>,
}

impl ImportanceMap {
    /// Wrap normalized values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidImportance`] if any value is not finite or
    /// falls outside `[0, 1]`.
    pub fn new(values: Array2<f32>) -> Result<Self> {
        if let Some(bad) = values
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(CoreError::InvalidImportance(format!(
                "value {bad} outside [0, 1]"
            )));
        }
        Ok(Self { values })
    }

    /// An all-zero map.
    #[must_use]
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            values: Array2::zeros((height, width)),
        }
    }

    /// Map height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Map width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Borrow the values.
    #[must_use]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// True when every cell is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Zero every cell strictly below `cutoff`; cells at or above it are kept.
    #[must_use]
    pub fn thresholded(&self, cutoff: f32) -> Self {
        Self {
            values: self.values.mapv(|v| if v < cutoff { 0.0 } else { v }),
        }
    }

    /// Row-major copy of the values.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }
}
