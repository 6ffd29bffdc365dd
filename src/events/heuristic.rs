// Threshold (rule-based) touch classifier
// Maps the normalized pressure deviation of a touch onto a label by bands

use serde::{Deserialize, Serialize};

/// One classification band: features below `upper` get `label`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelBand {
    pub upper: f64,
    pub label: String,
}

impl LabelBand {
    pub fn new(upper: f64, label: impl Into<String>) -> Self {
        LabelBand {
            upper,
            label: label.into(),
        }
    }
}

/// Configuration for the threshold classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Bands checked in ascending `upper` order
    pub bands: Vec<LabelBand>,

    /// Label for features above every band
    pub fallback: String,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            bands: vec![LabelBand::new(0.05, "1"), LabelBand::new(0.2, "2")],
            fallback: "3".to_string(),
        }
    }
}

/// Rule-based classifier for the single deviation feature.
/// Light presses move the pressure a few percent off baseline, firm ones more.
pub struct ThresholdClassifier {
    config: ThresholdConfig,
}

impl ThresholdClassifier {
    /// Create a new classifier with default bands
    pub fn new() -> Self {
        Self::with_config(ThresholdConfig::default())
    }

    /// Create a classifier with custom bands (sorted on construction)
    pub fn with_config(mut config: ThresholdConfig) -> Self {
        config.bands.sort_by(|a, b| a.upper.total_cmp(&b.upper));
        ThresholdClassifier { config }
    }

    /// Label for a deviation feature. The magnitude is used, so a negative
    /// baseline does not flip the ordering.
    pub fn classify(&self, feature: f64) -> &str {
        let magnitude = feature.abs();
        self.config
            .bands
            .iter()
            .find(|band| magnitude < band.upper)
            .map(|band| band.label.as_str())
            .unwrap_or(self.config.fallback.as_str())
    }
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self::new()
    }
}
