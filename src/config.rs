// Session configuration
// JSON configuration file overlaid by command-line flags

use std::path::{Path, PathBuf};

use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{ClassifierConfig, DetectorConfig};
use crate::sensor::AnalogSensor;
use crate::signal::FilterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything fixed at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial endpoint, e.g. `/dev/ttyUSB0`
    pub serial_port: Option<String>,
    pub baud_rate: u32,

    /// CSV record file (truncated at start)
    pub output_path: Option<PathBuf>,

    /// Echo records on stdout
    pub print_lines: bool,

    /// Comment written as `#<text>` before the header
    pub first_line: Option<String>,

    /// Log the measured sampling rate every `buffer_size / 4` samples
    pub print_hz: bool,

    /// Capacity of the raw and plot histories
    pub buffer_size: usize,

    /// Calibration bounds of the digital sensor in psi
    pub p_min: f64,
    pub p_max: f64,

    /// Convert raw counts to hPa before filtering
    pub convert_pressure: bool,

    /// Accept one report peer at `socket_addr` before ingesting
    pub socket: bool,
    pub socket_addr: String,

    pub filter: FilterConfig,
    pub detector: DetectorConfig,

    /// Transfer function used for the classification feature
    pub analog: AnalogSensor,
    pub classifier: ClassifierConfig,

    /// JSONL episode trace
    pub trace_path: Option<PathBuf>,

    /// Capture file replayed instead of the serial port
    pub replay: Option<PathBuf>,

    /// Synthetic sampling rate for replayed readings
    pub replay_rate_hz: f64,

    /// Log a sparkline of the plot history every N samples (0 = off)
    pub plot_every: usize,

    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            serial_port: None,
            baud_rate: 115200,
            output_path: None,
            print_lines: false,
            first_line: None,
            print_hz: false,
            buffer_size: 2048,
            p_min: 0.0,
            p_max: 25.0,
            convert_pressure: false,
            socket: false,
            socket_addr: "0.0.0.0:6969".to_string(),
            filter: FilterConfig::default(),
            detector: DetectorConfig::default(),
            analog: AnalogSensor::default(),
            classifier: ClassifierConfig::default(),
            trace_path: None,
            replay: None,
            replay_rate_hz: 100.0,
            plot_every: 0,
            log_level: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Load a JSON configuration file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Capacity of the baseline snapshot history
    pub fn baseline_capacity(&self) -> usize {
        (self.buffer_size / 4).max(1)
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.replay.is_none() && self.serial_port.as_deref().map_or(true, str::is_empty) {
            return invalid("a serial port (or --replay file) is required".to_string());
        }
        if self.detector.diff_window < 2 {
            return invalid(format!(
                "diff_window must be at least 2, got {}",
                self.detector.diff_window
            ));
        }
        if self.buffer_size <= self.detector.diff_window {
            return invalid(format!(
                "buffer_size ({}) must exceed diff_window ({})",
                self.buffer_size, self.detector.diff_window
            ));
        }
        if self.detector.touch_threshold == 0 {
            return invalid("touch_threshold must be positive".to_string());
        }
        if self.buffer_size <= self.detector.touch_threshold {
            return invalid(format!(
                "buffer_size ({}) must exceed touch_threshold ({}) to leave a baseline",
                self.buffer_size, self.detector.touch_threshold
            ));
        }
        if self.p_max == self.p_min {
            return invalid("p_max must differ from p_min".to_string());
        }
        if self.analog.pmax == self.analog.pmin || self.analog.vmax == self.analog.vmin {
            return invalid("analog sensor range is empty".to_string());
        }
        if !(self.filter.frequency > 0.0
            && self.filter.min_cutoff > 0.0
            && self.filter.derivative_cutoff > 0.0)
        {
            return invalid("filter frequency and cutoffs must be positive".to_string());
        }
        if self.filter.beta < 0.0 {
            return invalid("filter beta must not be negative".to_string());
        }
        if self.replay.is_some() && !(self.replay_rate_hz > 0.0) {
            return invalid("replay_rate_hz must be positive".to_string());
        }
        self.log_level_filter()?;

        Ok(())
    }
}

/// Stream pressure readings from a serial sensor and detect touches
#[derive(Debug, Parser)]
#[command(name = "airtouch", version, about)]
pub struct Cli {
    /// Serial port the sensor is attached to
    pub serial_port: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub baudrate: Option<u32>,

    /// Write CSV records to this file
    #[arg(short, long)]
    pub outpath: Option<PathBuf>,

    /// Print CSV records on stdout
    #[arg(long)]
    pub printlines: bool,

    /// Comment line written before the header
    #[arg(long)]
    pub firstline: Option<String>,

    /// Report the sampling rate
    #[arg(long)]
    pub print_hz: bool,

    /// History length in samples
    #[arg(long)]
    pub bufsize: Option<usize>,

    #[arg(long, allow_hyphen_values = true)]
    pub p_min: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub p_max: Option<f64>,

    /// Convert counts to hPa before filtering
    #[arg(long)]
    pub convert_pressure: bool,

    /// Wait for a report peer before reading the sensor
    #[arg(long)]
    pub socket: bool,

    #[arg(long)]
    pub socket_addr: Option<String>,

    #[arg(long)]
    pub event_threshold: Option<f64>,

    #[arg(long)]
    pub diff_window: Option<usize>,

    #[arg(long)]
    pub touch_threshold: Option<usize>,

    /// Write detector decisions and reports to a JSONL trace
    #[arg(long)]
    pub trace: Option<PathBuf>,

    /// Replay a capture file of raw readings instead of the serial port
    #[arg(long)]
    pub replay: Option<PathBuf>,

    #[arg(long)]
    pub replay_rate: Option<f64>,

    /// Log a sparkline every N samples
    #[arg(long)]
    pub plot_every: Option<usize>,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Resolve the final configuration: file (or defaults), then flags
    pub fn into_config(self) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };

        if let Some(port) = self.serial_port {
            config.serial_port = Some(port);
        }
        if let Some(baud) = self.baudrate {
            config.baud_rate = baud;
        }
        if let Some(path) = self.outpath {
            config.output_path = Some(path);
        }
        if let Some(line) = self.firstline {
            config.first_line = Some(line);
        }
        if let Some(size) = self.bufsize {
            config.buffer_size = size;
        }
        if let Some(p) = self.p_min {
            config.p_min = p;
        }
        if let Some(p) = self.p_max {
            config.p_max = p;
        }
        if let Some(addr) = self.socket_addr {
            config.socket_addr = addr;
        }
        if let Some(t) = self.event_threshold {
            config.detector.event_threshold = t;
        }
        if let Some(w) = self.diff_window {
            config.detector.diff_window = w;
        }
        if let Some(t) = self.touch_threshold {
            config.detector.touch_threshold = t;
        }
        if let Some(path) = self.trace {
            config.trace_path = Some(path);
        }
        if let Some(path) = self.replay {
            config.replay = Some(path);
        }
        if let Some(rate) = self.replay_rate {
            config.replay_rate_hz = rate;
        }
        if let Some(n) = self.plot_every {
            config.plot_every = n;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.print_lines |= self.printlines;
        config.print_hz |= self.print_hz;
        config.convert_pressure |= self.convert_pressure;
        config.socket |= self.socket;

        config.validate()?;
        Ok(config)
    }
}
