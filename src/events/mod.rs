// Event detection module
// Touch/release detection, classification trigger and classifier backends

pub mod backend;
pub mod detector;
pub mod heuristic;
pub mod trigger;
pub mod types;

pub use backend::{Classifier, ClassifierBackend, ClassifierConfig, ClassifierError, TouchClassifier};
pub use detector::{DetectorUpdate, EventDetector};
pub use heuristic::{LabelBand, ThresholdClassifier, ThresholdConfig};
pub use trigger::{touch_feature, ClassifierTrigger, FeatureError};
pub use types::{DetectorConfig, DetectorPhase, DetectorState, Report, TouchKind};
