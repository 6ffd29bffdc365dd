// Ingestion session
// Per-sample pipeline (convert, filter, detect, classify, dispatch) and the loop that feeds it

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::{
    ClassifierTrigger, EventDetector, Report, TouchClassifier, TouchKind,
};
use crate::output::{OutputDispatcher, PlotFrame, SampleRecord, NO_EVENT};
use crate::pipeline::control::{ControlCommand, ControlReceiver, RunFlag, TAG_COMMA};
use crate::pipeline::trace::{TraceEntry, TraceKind, TraceWriter};
use crate::sensor::{parse_reading, raw_to_hectopascal, LineRead, LineSource, TransportError};
use crate::signal::{stats, OneEuroFilter, RingBuffer};

/// One accepted reading as it moved through the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub raw_value: i64,
    pub converted_value: f64,

    /// Adaptive filter output
    pub filtered_value: f64,

    /// Value the detector and plot saw: the filter output, or the
    /// converted value while filtering is off
    pub plot_value: f64,
}

/// Everything a single sample produced
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub sample: Sample,
    pub decision: Option<TouchKind>,
    pub report: Option<Report>,
}

/// Counters logged when a session ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub samples: u64,
    pub parse_errors: u64,
    pub touches: u64,
    pub releases: u64,
    pub classifications: u64,
    pub no_touch_reports: u64,
    pub sink_failures: u64,
    pub dropped_reports: u64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples ({} bad lines), {} touches, {} releases, {} classified, \
             {} no-touch reports, {} sink failures, {} reports dropped",
            self.samples,
            self.parse_errors,
            self.touches,
            self.releases,
            self.classifications,
            self.no_touch_reports,
            self.sink_failures,
            self.dropped_reports,
        )
    }
}

/// Measures the sampling rate over fixed-size blocks of samples
struct RateMeter {
    every: usize,
    count: usize,
    started: Instant,
}

impl RateMeter {
    fn new(every: usize) -> Self {
        RateMeter {
            every: every.max(1),
            count: 0,
            started: Instant::now(),
        }
    }

    /// Returns the rate once per block
    fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        if self.count < self.every {
            return None;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            f64::INFINITY
        };
        self.count = 0;
        self.started = Instant::now();
        Some(rate)
    }
}

/// The per-sample processing chain.
///
/// Owns all mutable session state. Operator commands are applied between
/// samples through [`Pipeline::apply`].
pub struct Pipeline {
    convert_pressure: bool,
    p_min: f64,
    p_max: f64,
    first_line: Option<String>,

    filter: OneEuroFilter,
    filtering: bool,

    raw_values: RingBuffer<f64>,
    plot_values: RingBuffer<f64>,
    baseline_values: RingBuffer<f64>,
    baseline: Option<f64>,

    detector: EventDetector,
    trigger: ClassifierTrigger,
    classifier: Box<dyn TouchClassifier + Send>,

    dispatcher: OutputDispatcher,
    event_tag: Option<String>,

    trace: Option<TraceWriter>,
    episode: Option<Uuid>,

    rate: Option<RateMeter>,
    stats: SessionStats,
}

impl Pipeline {
    pub fn new(
        config: &SessionConfig,
        classifier: Box<dyn TouchClassifier + Send>,
        dispatcher: OutputDispatcher,
        trace: Option<TraceWriter>,
    ) -> Self {
        Pipeline {
            convert_pressure: config.convert_pressure,
            p_min: config.p_min,
            p_max: config.p_max,
            first_line: config.first_line.clone(),
            filter: OneEuroFilter::new(&config.filter),
            filtering: true,
            raw_values: RingBuffer::with_capacity(config.buffer_size),
            plot_values: RingBuffer::with_capacity(config.buffer_size),
            baseline_values: RingBuffer::with_capacity(config.baseline_capacity()),
            baseline: None,
            detector: EventDetector::new(config.detector.clone()),
            trigger: ClassifierTrigger::new(config.detector.touch_threshold, config.analog.clone()),
            classifier,
            dispatcher,
            event_tag: None,
            trace,
            episode: None,
            rate: config
                .print_hz
                .then(|| RateMeter::new(config.buffer_size / 4)),
            stats: SessionStats::default(),
        }
    }

    /// Write the record preamble and open the trace
    pub fn start(&mut self) {
        if self.dispatcher.has_record_sinks() {
            let failures = self.dispatcher.write_preamble(self.first_line.as_deref());
            self.stats.sink_failures += failures as u64;
        }

        let params = self.filter.params();
        let entry =
            TraceEntry::new(TraceKind::SessionStart, "session started").data(serde_json::json!({
                "detector": self.detector.config(),
                "cutoff": params.min_cutoff(),
                "beta": params.beta(),
            }));
        self.trace(entry);
    }

    /// Apply one operator command; takes effect from the next sample
    pub fn apply(&mut self, command: ControlCommand) {
        match &command {
            ControlCommand::DecreaseCutoff => self.filter.params_mut().nudge_cutoff(-1.0),
            ControlCommand::IncreaseCutoff => self.filter.params_mut().nudge_cutoff(1.0),
            ControlCommand::DecreaseBeta => self.filter.params_mut().nudge_beta(-1.0),
            ControlCommand::IncreaseBeta => self.filter.params_mut().nudge_beta(1.0),
            ControlCommand::ToggleFiltering => {
                self.filtering = !self.filtering;
                log::info!("Filtering {}", if self.filtering { "on" } else { "off" });
            }
            ControlCommand::SnapshotBaseline => {
                self.baseline = stats::median(&self.baseline_values.to_vec());
                match self.baseline {
                    Some(baseline) => log::info!("Baseline set to {:.4}", baseline),
                    None => log::warn!("No samples yet, baseline not set"),
                }
            }
            ControlCommand::SetEventTag(tag) => {
                let tag = tag.replace(',', TAG_COMMA);
                log::info!("Event tag: {}", tag);
                self.event_tag = Some(tag);
            }
            ControlCommand::ClearEventTag => {
                log::info!("Event tag cleared");
                self.event_tag = None;
            }
            ControlCommand::Quit => log::info!("Quit requested"),
        }

        if matches!(
            command,
            ControlCommand::DecreaseCutoff
                | ControlCommand::IncreaseCutoff
                | ControlCommand::DecreaseBeta
                | ControlCommand::IncreaseBeta
        ) {
            let params = self.filter.params();
            log::info!("cutoff: {}, beta: {}", params.min_cutoff(), params.beta());
        }

        let entry = TraceEntry::new(TraceKind::Control, format!("{:?}", command))
            .episode(self.episode);
        self.trace(entry);
    }

    /// Parse and process one transport line. Malformed lines are logged,
    /// counted and skipped without touching any state.
    pub fn process_line(&mut self, line: &str, timestamp: f64) -> Option<SampleOutcome> {
        match parse_reading(line) {
            Ok(raw) => Some(self.process(raw, timestamp)),
            Err(e) => {
                log::warn!("{}", e);
                self.stats.parse_errors += 1;
                None
            }
        }
    }

    /// Run one reading through convert, filter, buffers, detector, trigger
    /// and dispatch, in that order
    pub fn process(&mut self, raw: i64, timestamp: f64) -> SampleOutcome {
        self.stats.samples += 1;

        let converted = if self.convert_pressure {
            raw_to_hectopascal(raw, self.p_min, self.p_max)
        } else {
            raw as f64
        };

        let smoothed = self.filter.filter(converted, timestamp);
        let plot_value = if self.filtering { smoothed } else { converted };

        self.raw_values.push(converted);
        self.plot_values.push(plot_value);
        self.baseline_values.push(plot_value);

        let update = self.detector.update(&self.plot_values);
        if let Some(kind) = update.decision {
            log::info!("Detected a {}", kind);
            match kind {
                TouchKind::Touch => self.stats.touches += 1,
                TouchKind::Release => self.stats.releases += 1,
            }
            self.episode = Some(Uuid::new_v4());

            let mut entry = TraceEntry::new(TraceKind::Decision, kind.as_str())
                .episode(self.episode)
                .at(timestamp);
            if let Some(std_dev) = update.std_dev {
                entry = entry.data(serde_json::json!({ "std_dev": std_dev }));
            }
            self.trace(entry);
        }

        let report = self.trigger.on_sample(
            &mut self.detector,
            &self.plot_values,
            self.classifier.as_mut(),
        );
        if let Some(report) = &report {
            self.handle_report(report, timestamp);
        }

        let params = self.filter.params();
        let record = SampleRecord {
            timestamp,
            event: self.event_tag.as_deref().unwrap_or(NO_EVENT),
            sensor_count: raw,
            filtered: smoothed,
            converted,
            filtering: self.filtering,
            cutoff: params.min_cutoff(),
            beta: params.beta(),
        };
        self.stats.sink_failures += self.dispatcher.dispatch_record(&record) as u64;

        self.dispatcher.plot(&PlotFrame {
            values: &self.plot_values,
            baseline: self.baseline,
        });

        if let Some(rate) = self.rate.as_mut().and_then(RateMeter::tick) {
            log::info!("{:.2} Hz", rate);
        }

        SampleOutcome {
            sample: Sample {
                timestamp,
                raw_value: raw,
                converted_value: converted,
                filtered_value: smoothed,
                plot_value,
            },
            decision: update.decision,
            report,
        }
    }

    fn handle_report(&mut self, report: &Report, timestamp: f64) {
        let data = match report {
            Report::NoTouch => {
                self.stats.no_touch_reports += 1;
                log::debug!("No touch");
                None
            }
            Report::Label { label, feature } => {
                self.stats.classifications += 1;
                log::info!("Classified touch as {} (feature {:.6})", label, feature);
                Some(serde_json::json!({ "feature": feature }))
            }
        };

        if !self.dispatcher.dispatch_report(report) {
            self.stats.dropped_reports += 1;
        }

        let mut entry = TraceEntry::new(TraceKind::Report, report.wire_text())
            .episode(self.episode)
            .at(timestamp);
        if let Some(data) = data {
            entry = entry.data(data);
        }
        self.trace(entry);
    }

    /// Close sinks and the trace; returns the final counters
    pub fn finish(&mut self) -> SessionStats {
        self.dispatcher.close();

        let stats = self.stats.clone();
        if let Ok(data) = serde_json::to_value(&stats) {
            self.trace(TraceEntry::new(TraceKind::SessionEnd, "session ended").data(data));
        }
        self.trace = None;

        log::info!("Session ended: {}", stats);
        stats
    }

    fn trace(&mut self, entry: TraceEntry) {
        let Some(writer) = self.trace.as_mut() else {
            return;
        };
        if let Err(e) = writer.write(&entry) {
            log::warn!("Trace disabled after write failure to {}: {}", writer.path().display(), e);
            self.trace = None;
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn raw_values(&self) -> &RingBuffer<f64> {
        &self.raw_values
    }

    pub fn plot_values(&self) -> &RingBuffer<f64> {
        &self.plot_values
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn filtering(&self) -> bool {
        self.filtering
    }

    pub fn event_tag(&self) -> Option<&str> {
        self.event_tag.as_deref()
    }

    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }

    pub fn filter(&self) -> &OneEuroFilter {
        &self.filter
    }
}

/// Source of sample timestamps
#[derive(Debug, Clone, PartialEq)]
pub enum Clock {
    /// Wall-clock seconds since the Unix epoch
    Wall,

    /// Evenly spaced timestamps for replayed data
    Synthetic { next: f64, period: f64 },
}

impl Clock {
    pub fn synthetic(rate_hz: f64) -> Self {
        Clock::Synthetic {
            next: 0.0,
            period: 1.0 / rate_hz,
        }
    }

    pub fn now(&mut self) -> f64 {
        match self {
            Clock::Wall => Utc::now().timestamp_micros() as f64 / 1e6,
            Clock::Synthetic { next, period } => {
                let now = *next;
                *next += *period;
                now
            }
        }
    }
}

/// The ingestion loop: one line, one sample, until quit or end of input
pub struct Session<S> {
    source: S,
    pipeline: Pipeline,
    control: ControlReceiver,
    run: RunFlag,
    clock: Clock,
}

impl<S: LineSource> Session<S> {
    pub fn new(
        source: S,
        pipeline: Pipeline,
        control: ControlReceiver,
        run: RunFlag,
        clock: Clock,
    ) -> Self {
        Session {
            source,
            pipeline,
            control,
            run,
            clock,
        }
    }

    /// Drive the pipeline until the run flag clears or the source ends.
    /// Transport loss is fatal: sinks are closed and the error returned.
    pub fn run(mut self) -> Result<SessionStats, TransportError> {
        self.pipeline.start();

        while self.run.is_running() {
            let line = match self.source.read_line() {
                Ok(LineRead::Line(line)) => line,
                Ok(LineRead::Idle) => continue,
                Ok(LineRead::Eof) => {
                    log::info!("End of input");
                    break;
                }
                Err(e) => {
                    log::error!("Transport lost: {}", e);
                    self.pipeline.finish();
                    return Err(e);
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            for command in self.control.drain() {
                if command == ControlCommand::Quit {
                    self.run.stop();
                }
                self.pipeline.apply(command);
            }
            if !self.run.is_running() {
                break;
            }

            let timestamp = self.clock.now();
            self.pipeline.process_line(&line, timestamp);
        }

        Ok(self.pipeline.finish())
    }
}
