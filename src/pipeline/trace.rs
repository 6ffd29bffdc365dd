// Episode trace
// Per-session JSONL log of detector decisions, reports and operator commands

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// What a trace entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    SessionStart,
    Decision,
    Report,
    Control,
    SessionEnd,
}

/// A single line of the episode trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// ISO 8601 wall-clock time the entry was written
    pub timestamp: String,

    pub kind: TraceKind,

    /// Episode the entry belongs to; none before the first decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<Uuid>,

    /// Sample timestamp in seconds, when tied to a sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_ts: Option<f64>,

    pub message: String,

    /// Optional structured data (std dev, feature, parameters...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create a new trace entry with current timestamp
    pub fn new(kind: TraceKind, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            kind,
            episode: None,
            sample_ts: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn episode(mut self, episode: Option<Uuid>) -> Self {
        self.episode = episode;
        self
    }

    pub fn at(mut self, sample_ts: f64) -> Self {
        self.sample_ts = Some(sample_ts);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Trace file writer, kept open for the session
pub struct TraceWriter {
    file_path: PathBuf,
    file: BufWriter<File>,
}

impl TraceWriter {
    /// Create (or truncate) the trace file for this session
    pub fn open(file_path: PathBuf) -> Result<Self, TraceError> {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&file_path)?;

        Ok(TraceWriter {
            file_path,
            file: BufWriter::new(file),
        })
    }

    /// Append a trace entry; entries are flushed immediately
    pub fn write(&mut self, entry: &TraceEntry) -> Result<(), TraceError> {
        let json_line = entry.to_json_line()?;
        self.file.write_all(json_line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Get the trace file path
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
