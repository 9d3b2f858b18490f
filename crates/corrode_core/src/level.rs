//! Corrosion severity labels.

use serde::{Deserialize, Serialize};

/// Number of classes the fine-tuned classifier head outputs.
pub const N_CLASSES: usize = 5;

/// Corrosion level assigned to class index 0.
pub const LEVEL_OFFSET: u8 = 5;

/// Integer corrosion severity label (5–9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrosionLevel(u8);

impl CorrosionLevel {
    /// Lowest level the classifier can predict.
    pub const MIN: Self = Self(LEVEL_OFFSET);
    /// Highest level the classifier can predict.
    pub const MAX: Self = Self(LEVEL_OFFSET + N_CLASSES as u8 - 1);

    /// Map a class index to its corrosion level: `0 → 5, 1 → 6, …, 4 → 9`.
    ///
    /// Returns `None` for indices outside the classifier head.
    ///
    /// ```rust
    /// use corrode_core::CorrosionLevel;
    ///
    /// assert_eq!(CorrosionLevel::from_class_index(1).unwrap().value(), 6);
    /// assert!(CorrosionLevel::from_class_index(5).is_none());
    /// ```
    #[must_use]
    pub fn from_class_index(index: usize) -> Option<Self> {
        (index < N_CLASSES).then(|| Self(LEVEL_OFFSET + index as u8))
    }

    /// The numeric level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The class index this level corresponds to.
    #[must_use]
    pub const fn class_index(self) -> usize {
        (self.0 - LEVEL_OFFSET) as usize
    }
}

impl std::fmt::Display for CorrosionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Level as reported to clients: a number, or `"Unknown"` when the class
/// index has no mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelLabel {
    /// A mapped corrosion level.
    Known(CorrosionLevel),
    /// The class index had no corrosion level.
    Unknown(String),
}

impl LevelLabel {
    /// Label for a predicted class index.
    #[must_use]
    pub fn for_class_index(index: usize) -> Self {
        match CorrosionLevel::from_class_index(index) {
            Some(level) => Self::Known(level),
            None => Self::Unknown("Unknown".to_string()),
        }
    }

    /// The level, if known.
    #[must_use]
    pub fn level(&self) -> Option<CorrosionLevel> {
        match self {
            Self::Known(level) => Some(*level),
            Self::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for LevelLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(level) => write!(f, "{level}"),
            Self::Unknown(label) => f.write_str(label),
        }
    }
}
