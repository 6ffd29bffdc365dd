// Volatility-based touch detector
// Two-state hysteresis over the rolling standard deviation of the filtered signal

use crate::events::types::{DetectorConfig, DetectorPhase, DetectorState, TouchKind};
use crate::signal::stats;
use crate::signal::RingBuffer;

/// What a single detector step observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorUpdate {
    /// Rolling standard deviation; `None` while warming up
    pub std_dev: Option<f64>,

    /// Set on the sample where movement settled
    pub decision: Option<TouchKind>,
}

/// Touch/release state machine
///
/// In `WaitingForRise` the detector waits for the rolling standard deviation
/// to exceed `event_threshold`. In `WaitingForFall` it waits for it to drop
/// below again; at that instant the sign of
/// `current - value diff_window samples ago` decides touch (`> 0`) or release.
pub struct EventDetector {
    config: DetectorConfig,
    state: DetectorState,
    window: Vec<f64>,
}

impl EventDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let window = Vec::with_capacity(config.diff_window);
        EventDetector {
            config,
            state: DetectorState::default(),
            window,
        }
    }

    /// Feed the detector after the newest filtered value was pushed to `history`
    pub fn update(&mut self, history: &RingBuffer<f64>) -> DetectorUpdate {
        let diff_window = self.config.diff_window;
        if !self.is_warm(history) {
            return DetectorUpdate::default();
        }

        self.window.clear();
        self.window.extend(history.tail(diff_window).copied());
        let Some(std_dev) = stats::std_dev(&self.window) else {
            return DetectorUpdate::default();
        };

        let mut decision = None;
        match self.state.phase {
            DetectorPhase::WaitingForRise if std_dev > self.config.event_threshold => {
                log::debug!("Volatility rose to {:.3}", std_dev);
                self.state.phase = DetectorPhase::WaitingForFall;
            }
            DetectorPhase::WaitingForFall if std_dev < self.config.event_threshold => {
                let current = history.last().copied().unwrap_or_default();
                let lagged = history.nth_from_end(diff_window).copied().unwrap_or(current);
                let kind = if current - lagged > 0.0 {
                    TouchKind::Touch
                } else {
                    TouchKind::Release
                };

                self.state.phase = DetectorPhase::WaitingForRise;
                self.state.touch_active = kind == TouchKind::Touch;
                self.state.already_reported = false;
                decision = Some(kind);
            }
            _ => {}
        }

        if self.state.touch_active {
            self.state.touch_sample_count += 1;
        } else {
            self.state.touch_sample_count = 0;
        }

        DetectorUpdate {
            std_dev: Some(std_dev),
            decision,
        }
    }

    /// Enough history for a full rolling window
    pub fn is_warm(&self, history: &RingBuffer<f64>) -> bool {
        history.len() > self.config.diff_window
    }

    /// Record that the current episode produced its report
    pub fn mark_reported(&mut self) {
        self.state.already_reported = true;
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(diff_window: usize, event_threshold: f64) -> DetectorConfig {
        DetectorConfig {
            diff_window,
            event_threshold,
            touch_threshold: 1000,
        }
    }

    /// Exponential approach from `start` towards `target`, as a smoothed step looks
    fn approach(start: f64, target: f64, n: usize) -> Vec<f64> {
        (1..=n)
            .map(|i| target + (start - target) * 0.5f64.powi(i as i32))
            .collect()
    }

    fn run(detector: &mut EventDetector, history: &mut RingBuffer<f64>, values: &[f64]) -> Vec<TouchKind> {
        let mut decisions = Vec::new();
        for v in values {
            history.push(*v);
            if let Some(kind) = detector.update(history).decision {
                decisions.push(kind);
            }
        }
        decisions
    }

    #[test]
    fn test_warm_up_reports_nothing() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        for i in 0..10 {
            history.push(i as f64 * 100.0);
            assert_eq!(detector.update(&history), DetectorUpdate::default());
        }

        history.push(0.0);
        assert!(detector.update(&history).std_dev.is_some());
    }

    #[test]
    fn test_constant_signal_never_leaves_rise() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        let decisions = run(&mut detector, &mut history, &[5.0; 500]);

        assert!(decisions.is_empty());
        assert!(detector.state().wait_for_rise());
        assert_eq!(detector.state().touch_sample_count, 0);
    }

    #[test]
    fn test_step_up_is_one_touch() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        let mut signal = vec![0.0; 20];
        signal.extend(approach(0.0, 50.0, 40));
        let decisions = run(&mut detector, &mut history, &signal);

        assert_eq!(decisions, vec![TouchKind::Touch]);
        assert!(detector.state().touch_active);
        assert!(detector.state().touch_sample_count > 0);
    }

    #[test]
    fn test_step_down_is_one_release() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        let mut signal = vec![50.0; 20];
        signal.extend(approach(50.0, 0.0, 40));
        let decisions = run(&mut detector, &mut history, &signal);

        assert_eq!(decisions, vec![TouchKind::Release]);
        assert!(!detector.state().touch_active);
        assert_eq!(detector.state().touch_sample_count, 0);
    }

    #[test]
    fn test_zero_delta_is_release() {
        // A spike that returns to the same level settles with delta == 0
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        let mut signal = vec![5.0; 20];
        signal.push(80.0);
        signal.extend(vec![5.0; 30]);
        let decisions = run(&mut detector, &mut history, &signal);

        assert_eq!(decisions, vec![TouchKind::Release]);
    }

    #[test]
    fn test_press_then_release_cycle() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);

        let mut signal = vec![0.0; 20];
        signal.extend(approach(0.0, 50.0, 40));
        signal.extend(approach(50.0, 0.0, 40));
        let decisions = run(&mut detector, &mut history, &signal);

        assert_eq!(decisions, vec![TouchKind::Touch, TouchKind::Release]);
        assert_eq!(detector.state().touch_sample_count, 0);
    }

    #[test]
    fn test_decision_clears_reported_flag() {
        let mut detector = EventDetector::new(config(10, 1.0));
        let mut history = RingBuffer::with_capacity(64);
        detector.mark_reported();
        assert!(detector.state().already_reported);

        let mut signal = vec![0.0; 20];
        signal.extend(approach(0.0, 50.0, 40));
        run(&mut detector, &mut history, &signal);

        assert!(!detector.state().already_reported);
    }
}
