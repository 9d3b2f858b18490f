//! Designation of the internal feature layer used for attribution.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Residual stage whose output is captured for attribution.
///
/// Each variant names the output of the last block of a stage, i.e.
/// `Layer4` is the final convolutional feature map before pooling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLayer {
    /// Output of stage 1 (stride 4).
    Layer1,
    /// Output of stage 2 (stride 8).
    Layer2,
    /// Output of stage 3 (stride 16).
    Layer3,
    /// Output of stage 4 (stride 32).
    #[default]
    Layer4,
}

impl TargetLayer {
    /// All layers, shallow to deep.
    pub const ALL: [Self; 4] = [Self::Layer1, Self::Layer2, Self::Layer3, Self::Layer4];

    /// Zero-based stage index.
    #[must_use]
    pub const fn stage(self) -> usize {
        match self {
            Self::Layer1 => 0,
            Self::Layer2 => 1,
            Self::Layer3 => 2,
            Self::Layer4 => 3,
        }
    }

    /// Layer name as used in logs and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Layer1 => "layer1",
            Self::Layer2 => "layer2",
            Self::Layer3 => "layer3",
            Self::Layer4 => "layer4",
        }
    }
}

impl std::fmt::Display for TargetLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetLayer {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "layer1" | "1" => Ok(Self::Layer1),
            "layer2" | "2" => Ok(Self::Layer2),
            "layer3" | "3" => Ok(Self::Layer3),
            "layer4" | "4" => Ok(Self::Layer4),
            _ => Err(CoreError::UnknownLayer(s.to_string())),
        }
    }
}
