//! Image tensor shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape metadata for a single channel-first image tensor.
///
/// Follows the convention `(C, H, W)`; the batch dimension is added when the
/// tensor is handed to a classifier.
///
/// # Example
///
/// ```rust
/// use corrode_core::ImageShape;
///
/// let shape = ImageShape::PROCESSING;
/// assert_eq!(shape.channels(), 3);
/// assert_eq!(shape.height(), 224);
/// assert_eq!(shape.width(), 224);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageShape {
    /// Resolution the classifier was trained at: RGB, 224×224.
    pub const PROCESSING: Self = Self::new(3, 224, 224);

    /// Create a new shape.
    #[must_use]
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Square RGB shape with side `size`.
    #[must_use]
    pub const fn square_rgb(size: usize) -> Self {
        Self::new(3, size, size)
    }

    /// Create an ImageShape from a slice of dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 3 elements.
    ///
    /// # Example
    ///
    /// ```rust
    /// use corrode_core::ImageShape;
    ///
    /// let shape = ImageShape::from_dims(&[3, 224, 224]).unwrap();
    /// assert_eq!(shape, ImageShape::PROCESSING);
    /// ```
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() != 3 {
            return Err(CoreError::DimensionError {
                expected: 3,
                got: dims.len(),
            });
        }
        Ok(Self::new(dims[0], dims[1], dims[2]))
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Shape with a leading batch dimension of one: `[1, C, H, W]`.
    #[must_use]
    pub const fn batched(&self) -> [usize; 4] {
        [1, self.channels, self.height, self.width]
    }

    /// Validate that `dims` matches this shape.
    ///
    /// # Errors
    ///
    /// [`CoreError::DimensionError`] for a rank other than 3 and
    /// [`CoreError::InvalidShape`] for any differing dimension.
    pub fn validate(&self, dims: &[usize]) -> Result<()> {
        let got = Self::from_dims(dims)?;
        if got != *self {
            return Err(CoreError::InvalidShape {
                expected: self.to_string(),
                got: got.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.channels, self.height, self.width)
    }
}
