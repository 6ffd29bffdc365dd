// Touch detection types
// Detector configuration, state machine state and episode reports

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for the volatility-based touch detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Number of trailing samples in the rolling standard deviation window.
    /// Also the lag used to decide touch vs release.
    pub diff_window: usize,

    /// Standard deviation that separates a moving signal from a resting one
    pub event_threshold: f64,

    /// Dwell count a touch must exceed before it is classified.
    /// Also the length of the "touch" suffix of the classification window.
    pub touch_threshold: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            diff_window: 100,
            event_threshold: 7.0,
            touch_threshold: 1000,
        }
    }
}

/// Hysteresis phase of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorPhase {
    /// Signal at rest; waiting for volatility to rise above the threshold
    WaitingForRise,

    /// Signal moving; waiting for volatility to settle below the threshold
    WaitingForFall,
}

/// Outcome of a settled movement: did the pressure end up higher or lower?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchKind {
    Touch,
    Release,
}

impl TouchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TouchKind::Touch => "touch",
            TouchKind::Release => "release",
        }
    }
}

impl fmt::Display for TouchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable detector state, changed only by detector transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorState {
    pub phase: DetectorPhase,

    /// A touch decision is in effect for the current episode
    pub touch_active: bool,

    /// Consecutive samples with `touch_active` set (dwell count)
    pub touch_sample_count: usize,

    /// The current episode already produced its report
    pub already_reported: bool,
}

impl DetectorState {
    pub fn wait_for_rise(&self) -> bool {
        self.phase == DetectorPhase::WaitingForRise
    }
}

impl Default for DetectorState {
    fn default() -> Self {
        DetectorState {
            phase: DetectorPhase::WaitingForRise,
            touch_active: false,
            touch_sample_count: 0,
            already_reported: false,
        }
    }
}

/// The single report an episode produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Report {
    /// No touch in effect
    NoTouch,

    /// A touch was classified
    Label { label: String, feature: f64 },
}

impl Report {
    /// Text sent to the socket peer (without the line terminator)
    pub fn wire_text(&self) -> &str {
        match self {
            Report::NoTouch => "0",
            Report::Label { label, .. } => label,
        }
    }
}
