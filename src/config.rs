use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::continuum::contmask::ContinuumThresholds;
use crate::continuum::segments::SegmentRanges;
use crate::data::model::WavelengthScale;

/// Settings for one normalization run, usually read from JSON:
///
/// ```json
/// {
///   "segments": [[371, 3192], [3697, 5997], [6461, 8255]],
///   "degree": 3,
///   "thresholds": { "f_cut": 1e-4, "sigma_cut": 5e-3 },
///   "wavelength_scale": "log10"
/// }
/// ```
///
/// Only `segments` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Pixel ranges fit independently; instrument specific.
    pub segments: SegmentRanges,

    /// Chebyshev degree per segment.
    #[serde(default = "default_degree")]
    pub degree: usize,

    #[serde(default)]
    pub thresholds: ContinuumThresholds,

    /// Uncertainty given to masked raw pixels before fitting.
    #[serde(default = "default_error_fill")]
    pub error_fill: f64,

    #[serde(default)]
    pub wavelength_scale: WavelengthScale,

    /// Fit stars on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_degree() -> usize {
    3
}

fn default_error_fill() -> f64 {
    1e6
}

fn default_parallel() -> bool {
    true
}

impl NormalizationConfig {
    /// Defaults for everything but the segments.
    pub fn with_segments(segments: SegmentRanges) -> Self {
        Self {
            segments,
            degree: default_degree(),
            thresholds: ContinuumThresholds::default(),
            error_fill: default_error_fill(),
            wavelength_scale: WavelengthScale::default(),
            parallel: default_parallel(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }
}
