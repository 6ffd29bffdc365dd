// Classification trigger
// Fires the classifier once per touch episode after the dwell threshold

use thiserror::Error;

use crate::events::backend::TouchClassifier;
use crate::events::detector::EventDetector;
use crate::events::types::Report;
use crate::sensor::AnalogSensor;
use crate::signal::{stats, RingBuffer};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Window of {len} samples is too short for a {required}-sample touch")]
    WindowTooShort { len: usize, required: usize },

    #[error("Division by zero: baseline pressure is zero")]
    DivisionByZero,
}

/// Normalized deviation of a touch from its baseline.
///
/// The window is split into a baseline prefix (all but the last
/// `touch_len` samples) and a touch suffix (the last `touch_len` samples).
/// Both are converted to pressure; the result is the mean of
/// `|touch - median(baseline)| / median(baseline)`.
pub fn touch_feature(
    window: &[f64],
    touch_len: usize,
    sensor: &AnalogSensor,
) -> Result<f64, FeatureError> {
    if touch_len == 0 || window.len() <= touch_len {
        return Err(FeatureError::WindowTooShort {
            len: window.len(),
            required: touch_len,
        });
    }

    let (prefix, suffix) = window.split_at(window.len() - touch_len);
    let prefix: Vec<f64> = prefix.iter().map(|v| sensor.to_pressure(*v)).collect();
    let baseline = stats::median(&prefix).ok_or(FeatureError::WindowTooShort {
        len: window.len(),
        required: touch_len,
    })?;

    if baseline.abs() < f64::EPSILON || !baseline.is_finite() {
        return Err(FeatureError::DivisionByZero);
    }

    let deviations: Vec<f64> = suffix
        .iter()
        .map(|v| (sensor.to_pressure(*v) - baseline).abs() / baseline)
        .collect();

    stats::mean(&deviations).ok_or(FeatureError::WindowTooShort {
        len: window.len(),
        required: touch_len,
    })
}

/// Decides when an episode reports, and what
pub struct ClassifierTrigger {
    touch_threshold: usize,
    sensor: AnalogSensor,
    window: Vec<f64>,
}

impl ClassifierTrigger {
    pub fn new(touch_threshold: usize, sensor: AnalogSensor) -> Self {
        ClassifierTrigger {
            touch_threshold,
            sensor,
            window: Vec::new(),
        }
    }

    /// Run after the detector has seen the newest sample.
    ///
    /// Returns `Report::NoTouch` once per episode without a touch, and a
    /// label once per touch whose dwell count exceeded the threshold. A
    /// failed feature or classifier call is logged and the episode stays
    /// silent.
    pub fn on_sample(
        &mut self,
        detector: &mut EventDetector,
        history: &RingBuffer<f64>,
        classifier: &mut dyn TouchClassifier,
    ) -> Option<Report> {
        if !detector.is_warm(history) || detector.state().already_reported {
            return None;
        }

        if !detector.state().touch_active {
            detector.mark_reported();
            return Some(Report::NoTouch);
        }

        if detector.state().touch_sample_count <= self.touch_threshold {
            return None;
        }

        // One attempt per episode, successful or not
        detector.mark_reported();

        self.window.clear();
        self.window.extend(history.iter().copied());
        let feature = match touch_feature(&self.window, self.touch_threshold, &self.sensor) {
            Ok(feature) => feature,
            Err(e) => {
                log::warn!("Skipping classification: {}", e);
                return None;
            }
        };

        match classifier.classify(&[feature]) {
            Ok(label) => Some(Report::Label { label, feature }),
            Err(e) => {
                log::warn!("Classifier miss for feature {:.6}: {}", feature, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::backend::ClassifierError;
    use crate::events::types::DetectorConfig;

    fn detector(touch_threshold: usize) -> EventDetector {
        EventDetector::new(DetectorConfig {
            diff_window: 10,
            event_threshold: 1.0,
            touch_threshold,
        })
    }

    /// Push a smoothed step from `from` to `to` so the detector decides touch
    fn press(history: &mut RingBuffer<f64>, detector: &mut EventDetector, from: f64, to: f64) {
        for _ in 0..20 {
            history.push(from);
            detector.update(history);
        }
        for i in 1..=30 {
            history.push(to + (from - to) * 0.5f64.powi(i));
            detector.update(history);
        }
    }

    #[test]
    fn test_feature_of_known_window() {
        let sensor = AnalogSensor::default();
        // Baseline 204.8 counts = 1 V = 0.75 pressure units; touch 409.6 counts = 2.25
        let mut window = vec![204.8; 6];
        window.extend(vec![409.6; 4]);

        let feature = touch_feature(&window, 4, &sensor).unwrap();
        assert!((feature - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_feature_zero_baseline_is_division_by_zero() {
        let sensor = AnalogSensor::default();
        // 102.4 counts is exactly vmin, i.e. zero pressure
        let mut window = vec![102.4; 6];
        window.extend(vec![300.0; 4]);

        assert_eq!(
            touch_feature(&window, 4, &sensor),
            Err(FeatureError::DivisionByZero)
        );
    }

    #[test]
    fn test_feature_short_window() {
        let sensor = AnalogSensor::default();
        let result = touch_feature(&[1.0, 2.0, 3.0], 3, &sensor);
        assert!(matches!(result, Err(FeatureError::WindowTooShort { len: 3, required: 3 })));
    }

    #[test]
    fn test_no_touch_reported_once() {
        let mut detector = detector(5);
        let mut history = RingBuffer::with_capacity(64);
        let mut trigger = ClassifierTrigger::new(5, AnalogSensor::default());
        let mut classifier = |_: &[f64]| -> Result<String, ClassifierError> { Ok("x".to_string()) };

        let mut reports = Vec::new();
        for _ in 0..40 {
            history.push(300.0);
            detector.update(&history);
            if let Some(report) = trigger.on_sample(&mut detector, &history, &mut classifier) {
                reports.push(report);
            }
        }

        assert_eq!(reports, vec![Report::NoTouch]);
    }

    #[test]
    fn test_fires_once_per_touch_episode() {
        let mut detector = detector(5);
        let mut history = RingBuffer::with_capacity(64);
        let mut trigger = ClassifierTrigger::new(5, AnalogSensor::default());
        let mut calls = 0;
        let mut classifier = |_: &[f64]| -> Result<String, ClassifierError> {
            calls += 1;
            Ok("2".to_string())
        };

        press(&mut history, &mut detector, 300.0, 600.0);
        assert!(detector.state().touch_active);

        // Dwell well past the threshold: 50 samples above it
        let mut labels = 0;
        for _ in 0..60 {
            history.push(600.0);
            detector.update(&history);
            if let Some(Report::Label { .. }) =
                trigger.on_sample(&mut detector, &history, &mut classifier)
            {
                labels += 1;
            }
        }

        drop(classifier);
        assert_eq!(labels, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_classifier_error_is_a_silent_miss() {
        let mut detector = detector(5);
        let mut history = RingBuffer::with_capacity(64);
        let mut trigger = ClassifierTrigger::new(5, AnalogSensor::default());
        let mut classifier = |_: &[f64]| -> Result<String, ClassifierError> {
            Err(ClassifierError::ClassificationError("boom".to_string()))
        };

        press(&mut history, &mut detector, 300.0, 600.0);

        let mut reports = Vec::new();
        for _ in 0..20 {
            history.push(600.0);
            detector.update(&history);
            if let Some(report) = trigger.on_sample(&mut detector, &history, &mut classifier) {
                reports.push(report);
            }
        }

        assert!(reports.is_empty());
        assert!(detector.state().already_reported);
    }
}
