// Airtouch - Serial pressure sensor touch detector
// Module declarations and session wiring

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

pub mod config;
pub mod events;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod sensor;
pub mod signal;

use config::{ConfigError, SessionConfig};
use events::{Classifier, ClassifierConfig, ClassifierError, TouchClassifier};
use output::{accept_peer, spawn_writer, OutputDispatcher, RecordSink, SinkError, SparklinePlot};
use pipeline::{
    control_channel, spawn_stdin_reader, Clock, ControlReceiver, Pipeline, RunFlag, Session,
    SessionStats, TraceError, TraceWriter,
};
use sensor::{LineSource, ReplayTransport, SerialTransport, TransportError};

/// How long the socket writer may take to flush queued reports at exit
const SOCKET_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Sparkline width in columns
const PLOT_WIDTH: usize = 64;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Classifier setup failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Trace setup failed: {0}")]
    Trace(#[from] TraceError),

    #[error("Socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("Ingestion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Build the configured classifier. A model backend that exists on disk
/// but cannot run yet leaves every touch unclassified instead of failing.
fn build_classifier(
    config: &ClassifierConfig,
) -> Result<Box<dyn TouchClassifier + Send>, ClassifierError> {
    match Classifier::new(config) {
        Ok(classifier) => {
            log::info!("Using {:?} classifier", classifier.backend());
            Ok(Box::new(classifier))
        }
        Err(ClassifierError::BackendNotImplemented(backend)) => {
            log::warn!("{:?} backend not implemented, touches will not be classified", backend);
            Ok(Box::new(move |_: &[f64]| -> Result<String, ClassifierError> {
                Err(ClassifierError::BackendNotImplemented(backend))
            }))
        }
        Err(e) => Err(e),
    }
}

fn spawn_session<S>(
    source: S,
    pipeline: Pipeline,
    control: ControlReceiver,
    run: RunFlag,
    clock: Clock,
) -> JoinHandle<Result<SessionStats, TransportError>>
where
    S: LineSource + Send + 'static,
{
    let session = Session::new(source, pipeline, control, run, clock);
    tokio::task::spawn_blocking(move || session.run())
}

/// Run one detection session until quit, Ctrl-C or end of replay input.
///
/// With `stdin_control`, operator commands are read from stdin.
pub async fn run(config: SessionConfig, stdin_control: bool) -> Result<SessionStats, AppError> {
    config.validate()?;

    let classifier = build_classifier(&config.classifier)?;

    let mut dispatcher = OutputDispatcher::new();
    if config.print_lines {
        dispatcher = dispatcher.with_sink(RecordSink::console());
    }
    if let Some(path) = &config.output_path {
        dispatcher = dispatcher.with_sink(RecordSink::file(path)?);
    }
    if config.plot_every > 0 {
        dispatcher = dispatcher.with_plot(SparklinePlot::new(config.plot_every, PLOT_WIDTH));
    }

    let trace = config
        .trace_path
        .clone()
        .map(TraceWriter::open)
        .transpose()?;

    let mut writer = None;
    if config.socket {
        let stream = accept_peer(&config.socket_addr)
            .await
            .map_err(AppError::Socket)?;
        let (sink, handle) = spawn_writer(stream);
        dispatcher = dispatcher.with_socket(sink);
        writer = Some(handle);
    }

    let run = RunFlag::new();
    let (handle, control) = control_channel(run.clone());
    if stdin_control {
        spawn_stdin_reader(handle.clone());
    }

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping");
            interrupt.quit();
        }
    });

    let pipeline = Pipeline::new(&config, classifier, dispatcher, trace);
    let session = match (&config.replay, &config.serial_port) {
        (Some(path), _) => spawn_session(
            ReplayTransport::open(path)?,
            pipeline,
            control,
            run.clone(),
            Clock::synthetic(config.replay_rate_hz),
        ),
        (None, Some(port)) => spawn_session(
            SerialTransport::open(port, config.baud_rate)?,
            pipeline,
            control,
            run.clone(),
            Clock::Wall,
        ),
        (None, None) => {
            return Err(ConfigError::Invalid("no serial port configured".to_string()).into())
        }
    };

    let result = session.await;
    run.stop();

    if let Some(writer) = writer {
        if tokio::time::timeout(SOCKET_DRAIN_TIMEOUT, writer).await.is_err() {
            log::warn!("Report peer did not drain within {:?}", SOCKET_DRAIN_TIMEOUT);
        }
    }

    Ok(result??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::HEADER;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replay_session_writes_records() {
        let temp_dir = TempDir::new().unwrap();
        let capture = temp_dir.path().join("capture.txt");
        let output = temp_dir.path().join("out").join("session.csv");

        let mut file = std::fs::File::create(&capture).unwrap();
        for _ in 0..50 {
            writeln!(file, "8000000").unwrap();
        }
        writeln!(file, "not a number").unwrap();
        drop(file);

        let config = SessionConfig {
            replay: Some(capture),
            output_path: Some(output.clone()),
            first_line: Some("bench".to_string()),
            convert_pressure: true,
            ..SessionConfig::default()
        };

        let stats = run(config, false).await.unwrap();
        assert_eq!(stats.samples, 50);
        assert_eq!(stats.parse_errors, 1);

        let contents = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "#bench");
        assert_eq!(lines[1], HEADER);
        assert_eq!(lines.len(), 52);
        assert!(lines[2].starts_with("0.0000,0,8000000,"));
    }

    #[tokio::test]
    async fn test_missing_replay_file() {
        let config = SessionConfig {
            replay: Some("/nonexistent/capture.txt".into()),
            ..SessionConfig::default()
        };

        let result = run(config, false).await;
        assert!(matches!(
            result,
            Err(AppError::Transport(TransportError::Replay(_)))
        ));
    }

    #[test]
    fn test_model_backend_falls_back_to_miss() {
        let temp_dir = TempDir::new().unwrap();
        let model = temp_dir.path().join("model.bin");
        std::fs::write(&model, b"weights").unwrap();

        let config = ClassifierConfig {
            backend: events::ClassifierBackend::Model,
            model_path: Some(model),
            ..ClassifierConfig::default()
        };
        let mut classifier = build_classifier(&config).unwrap();
        assert!(matches!(
            classifier.classify(&[0.1]),
            Err(ClassifierError::BackendNotImplemented(_))
        ));

        let missing = ClassifierConfig {
            backend: events::ClassifierBackend::Model,
            model_path: None,
            ..ClassifierConfig::default()
        };
        assert!(build_classifier(&missing).is_err());
    }
}
