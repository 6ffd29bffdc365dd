// Classifier backend abstraction
// Supports a threshold classifier and a trained model (not yet available)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::events::heuristic::{ThresholdClassifier, ThresholdConfig};

/// Classification backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Band thresholds over the deviation feature
    Threshold,

    /// Trained model loaded from disk (future)
    Model,
}

/// Errors that can occur during classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Backend not implemented: {0:?}")]
    BackendNotImplemented(ClassifierBackend),

    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Classification failed: {0}")]
    ClassificationError(String),
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,

    /// Bands for the threshold backend
    pub threshold: ThresholdConfig,

    /// Model file for the model backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            backend: ClassifierBackend::Threshold,
            threshold: ThresholdConfig::default(),
            model_path: None,
        }
    }
}

/// Feature vector in, label out
pub trait TouchClassifier {
    fn classify(&mut self, features: &[f64]) -> Result<String, ClassifierError>;
}

impl<F> TouchClassifier for F
where
    F: FnMut(&[f64]) -> Result<String, ClassifierError>,
{
    fn classify(&mut self, features: &[f64]) -> Result<String, ClassifierError> {
        self(features)
    }
}

/// Unified classifier over the configured backend
pub struct Classifier {
    backend: ClassifierBackend,
    threshold: Option<ThresholdClassifier>,
}

impl Classifier {
    /// Create a classifier for the configured backend
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        match config.backend {
            ClassifierBackend::Threshold => Ok(Classifier {
                backend: config.backend,
                threshold: Some(ThresholdClassifier::with_config(config.threshold.clone())),
            }),
            ClassifierBackend::Model => match &config.model_path {
                None => Err(ClassifierError::ModelLoadError(
                    "no model path configured".to_string(),
                )),
                Some(path) if !path.exists() => Err(ClassifierError::ModelLoadError(format!(
                    "{} does not exist",
                    path.display()
                ))),
                Some(_) => Err(ClassifierError::BackendNotImplemented(config.backend)),
            },
        }
    }

    /// Threshold classifier with default bands (convenience method)
    pub fn new_threshold() -> Self {
        Classifier {
            backend: ClassifierBackend::Threshold,
            threshold: Some(ThresholdClassifier::new()),
        }
    }

    /// Get the current backend type
    pub fn backend(&self) -> ClassifierBackend {
        self.backend
    }
}

impl TouchClassifier for Classifier {
    fn classify(&mut self, features: &[f64]) -> Result<String, ClassifierError> {
        let [feature] = features else {
            return Err(ClassifierError::ClassificationError(format!(
                "expected 1 feature, got {}",
                features.len()
            )));
        };
        if !feature.is_finite() {
            return Err(ClassifierError::ClassificationError(format!(
                "non-finite feature {}",
                feature
            )));
        }

        match (self.backend, &self.threshold) {
            (ClassifierBackend::Threshold, Some(classifier)) => {
                Ok(classifier.classify(*feature).to_string())
            }
            (ClassifierBackend::Threshold, None) => Err(ClassifierError::ClassificationError(
                "Threshold classifier not initialized".to_string(),
            )),
            (ClassifierBackend::Model, _) => {
                Err(ClassifierError::BackendNotImplemented(ClassifierBackend::Model))
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new_threshold()
    }
}
