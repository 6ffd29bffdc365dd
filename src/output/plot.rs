// Live plot observer
// Narrow interface through which a plot consumes the filtered history

use crate::signal::RingBuffer;

/// What a plot needs to redraw after each sample
#[derive(Debug, Clone, Copy)]
pub struct PlotFrame<'a> {
    /// Plot history, oldest first
    pub values: &'a RingBuffer<f64>,

    /// Operator baseline snapshot, if one was taken
    pub baseline: Option<f64>,
}

pub trait PlotSink {
    fn on_sample_processed(&mut self, frame: &PlotFrame<'_>);
}

/// Plot that draws nothing
pub struct NoPlot;

impl PlotSink for NoPlot {
    fn on_sample_processed(&mut self, _frame: &PlotFrame<'_>) {}
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render values as a fixed-width sparkline (each column is a bucket mean)
pub fn sparkline(values: &[f64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let columns = width.min(values.len());
    let means: Vec<f64> = (0..columns)
        .map(|c| {
            let start = c * values.len() / columns;
            let end = ((c + 1) * values.len() / columns).max(start + 1);
            values[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect();

    let lo = means.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    means
        .iter()
        .map(|m| {
            if span <= 0.0 || !span.is_finite() {
                BARS[0]
            } else {
                let level = ((m - lo) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[level.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// Terminal stand-in for the GUI plot: logs a sparkline every `every` samples
pub struct SparklinePlot {
    every: usize,
    width: usize,
    seen: usize,
}

impl SparklinePlot {
    pub fn new(every: usize, width: usize) -> Self {
        SparklinePlot {
            every: every.max(1),
            width,
            seen: 0,
        }
    }
}

impl PlotSink for SparklinePlot {
    fn on_sample_processed(&mut self, frame: &PlotFrame<'_>) {
        self.seen += 1;
        if self.seen % self.every != 0 {
            return;
        }

        let values = frame.values.to_vec();
        let last = values.last().copied().unwrap_or_default();
        match frame.baseline {
            Some(baseline) => log::debug!(
                "{} {:.3} (baseline {:.3})",
                sparkline(&values, self.width),
                last,
                baseline
            ),
            None => log::debug!("{} {:.3}", sparkline(&values, self.width), last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_ramp() {
        let values: Vec<f64> = (0..8).map(|v| v as f64).collect();
        assert_eq!(sparkline(&values, 8), "▁▂▃▄▅▆▇█");
    }

    #[test]
    fn test_sparkline_flat_and_empty() {
        assert_eq!(sparkline(&[3.0; 5], 5), "▁▁▁▁▁");
        assert_eq!(sparkline(&[], 10), "");
    }

    #[test]
    fn test_sparkline_buckets_to_width() {
        let values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        assert_eq!(sparkline(&values, 10).chars().count(), 10);
    }
}
