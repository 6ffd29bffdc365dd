// Adaptive low-pass filter (One Euro filter)
// Speed-dependent smoothing: heavy at rest, light while the signal moves fast

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Step applied by one cutoff nudge
pub const CUTOFF_STEP: f64 = 0.01;

/// Step applied by one beta nudge
pub const BETA_STEP: f64 = 0.01;

/// Smallest cutoff a nudge may reach; a zero cutoff would freeze the output
pub const MIN_CUTOFF_FLOOR: f64 = 0.01;

/// Static filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Nominal sampling rate in Hz, used until two timestamps are seen
    pub frequency: f64,

    /// Initial minimum cutoff frequency in Hz (live-tunable)
    pub min_cutoff: f64,

    /// Initial speed coefficient (live-tunable)
    pub beta: f64,

    /// Cutoff of the derivative low-pass in Hz (fixed)
    pub derivative_cutoff: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            frequency: 100.0,
            min_cutoff: 0.25,
            beta: 0.1,
            derivative_cutoff: 1.0,
        }
    }
}

/// The two operator-adjustable filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    min_cutoff: f64,
    beta: f64,
}

impl FilterParams {
    pub fn new(min_cutoff: f64, beta: f64) -> Self {
        FilterParams {
            min_cutoff: min_cutoff.max(MIN_CUTOFF_FLOOR),
            beta: beta.max(0.0),
        }
    }

    pub fn min_cutoff(&self) -> f64 {
        self.min_cutoff
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Set the minimum cutoff, clamped to `MIN_CUTOFF_FLOOR`
    pub fn set_min_cutoff(&mut self, min_cutoff: f64) {
        self.min_cutoff = min_cutoff.max(MIN_CUTOFF_FLOOR);
    }

    /// Set beta, clamped to be non-negative
    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta.max(0.0);
    }

    pub fn nudge_cutoff(&mut self, steps: f64) {
        self.set_min_cutoff(self.min_cutoff + steps * CUTOFF_STEP);
    }

    pub fn nudge_beta(&mut self, steps: f64) {
        self.set_beta(self.beta + steps * BETA_STEP);
    }
}

/// First-order exponential smoother that remembers its last raw input
#[derive(Debug, Clone, Default)]
struct LowPass {
    last_raw: Option<f64>,
    smoothed: Option<f64>,
}

impl LowPass {
    fn apply(&mut self, value: f64, alpha: f64) -> f64 {
        let s = match self.smoothed {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.last_raw = Some(value);
        self.smoothed = Some(s);
        s
    }
}

/// Smoothing factor for a cutoff frequency at a sampling rate
fn smoothing_factor(cutoff: f64, rate: f64) -> f64 {
    let te = 1.0 / rate;
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau / te)
}

/// One Euro filter with live-tunable cutoff and beta
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    params: FilterParams,
    derivative_cutoff: f64,
    rate: f64,
    value: LowPass,
    derivative: LowPass,
    last_timestamp: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(config: &FilterConfig) -> Self {
        OneEuroFilter {
            params: FilterParams::new(config.min_cutoff, config.beta),
            derivative_cutoff: config.derivative_cutoff,
            rate: config.frequency,
            value: LowPass::default(),
            derivative: LowPass::default(),
            last_timestamp: None,
        }
    }

    /// Smooth one value observed at `timestamp` seconds.
    ///
    /// The first call returns `value` unchanged. A timestamp that does not
    /// advance keeps the previous sampling rate.
    pub fn filter(&mut self, value: f64, timestamp: f64) -> f64 {
        if let Some(last) = self.last_timestamp {
            let dt = timestamp - last;
            if dt > 0.0 && dt.is_finite() {
                self.rate = 1.0 / dt;
                self.last_timestamp = Some(timestamp);
            } else {
                log::debug!("Non-increasing timestamp (dt = {}), reusing {:.2} Hz", dt, self.rate);
            }
        } else {
            self.last_timestamp = Some(timestamp);
        }

        let dx = match self.value.last_raw {
            Some(prev) => (value - prev) * self.rate,
            None => 0.0,
        };
        let edx = self
            .derivative
            .apply(dx, smoothing_factor(self.derivative_cutoff, self.rate));

        let cutoff = self.params.min_cutoff + self.params.beta * edx.abs();
        self.value.apply(value, smoothing_factor(cutoff, self.rate))
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    /// Mutable access for operator nudges; applies from the next sample on
    pub fn params_mut(&mut self) -> &mut FilterParams {
        &mut self.params
    }

    /// Sampling rate currently in use
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(filter: &mut OneEuroFilter, values: &[f64], start: f64, dt: f64) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| filter.filter(*v, start + i as f64 * dt))
            .collect()
    }

    #[test]
    fn test_first_value_passes_through() {
        let mut filter = OneEuroFilter::new(&FilterConfig::default());
        assert_eq!(filter.filter(123.5, 10.0), 123.5);
    }

    #[test]
    fn test_constant_signal_stays_constant() {
        let mut filter = OneEuroFilter::new(&FilterConfig::default());
        let out = feed(&mut filter, &[50.0; 200], 0.0, 0.01);
        for v in out {
            assert!((v - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_repeated_timestamp_does_not_divide_by_zero() {
        let mut filter = OneEuroFilter::new(&FilterConfig::default());
        filter.filter(10.0, 1.0);
        let a = filter.filter(20.0, 1.0);
        let b = filter.filter(20.0, 1.0);

        assert!(a.is_finite());
        assert!(b.is_finite());
        assert_eq!(filter.rate(), 100.0);
    }

    #[test]
    fn test_rate_follows_timestamps() {
        let mut filter = OneEuroFilter::new(&FilterConfig::default());
        feed(&mut filter, &[1.0, 1.0, 1.0], 0.0, 0.02);
        assert!((filter.rate() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_step_is_smoothed() {
        let mut filter = OneEuroFilter::new(&FilterConfig::default());
        feed(&mut filter, &[0.0; 50], 0.0, 0.01);
        let after_step = filter.filter(100.0, 0.5);

        assert!(after_step > 0.0);
        assert!(after_step < 100.0);
    }

    #[test]
    fn test_higher_cutoff_tracks_faster() {
        let config = FilterConfig {
            beta: 0.0,
            ..FilterConfig::default()
        };

        let mut slow = OneEuroFilter::new(&config);
        let mut fast = OneEuroFilter::new(&config);
        fast.params_mut().set_min_cutoff(5.0);

        let mut signal = vec![0.0; 20];
        signal.extend(vec![10.0; 20]);
        let slow_out = feed(&mut slow, &signal, 0.0, 0.01);
        let fast_out = feed(&mut fast, &signal, 0.0, 0.01);

        assert!(fast_out[39] > slow_out[39]);
    }

    #[test]
    fn test_params_are_clamped() {
        let mut params = FilterParams::new(0.02, 0.01);
        params.nudge_cutoff(-5.0);
        params.nudge_beta(-5.0);

        assert_eq!(params.min_cutoff(), MIN_CUTOFF_FLOOR);
        assert_eq!(params.beta(), 0.0);

        params.nudge_beta(2.0);
        assert!((params.beta() - 0.02).abs() < 1e-12);
    }
}
