// Output dispatcher
// Fans records out to console/file sinks and reports to the socket peer

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::events::Report;
use crate::output::plot::{NoPlot, PlotFrame, PlotSink};
use crate::output::record::{SampleRecord, HEADER};
use crate::output::socket::SocketSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{sink} write failed: {source}")]
    Write {
        sink: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create output file: {0}")]
    Create(#[source] io::Error),

    #[error("Socket queue full, report dropped")]
    QueueFull,

    #[error("Socket peer closed")]
    Closed,
}

/// A line-oriented record destination
pub struct RecordSink {
    name: &'static str,
    writer: Box<dyn Write + Send>,
    failures: u64,
}

impl RecordSink {
    /// Records on stdout
    pub fn console() -> Self {
        Self::from_writer("console", io::stdout())
    }

    /// Records in a newly created (truncated) file
    pub fn file(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(SinkError::Create)?;
        }
        let file = File::create(path).map_err(SinkError::Create)?;
        log::info!("Writing records to {}", path.display());
        Ok(Self::from_writer("file", BufWriter::new(file)))
    }

    pub fn from_writer(name: &'static str, writer: impl Write + Send + 'static) -> Self {
        RecordSink {
            name,
            writer: Box::new(writer),
            failures: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"));

        result.map_err(|source| {
            self.failures += 1;
            SinkError::Write {
                sink: self.name,
                source,
            }
        })
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Write {
            sink: self.name,
            source,
        })
    }
}

/// Routes each processed sample to every enabled sink.
/// A failing sink never prevents the others from receiving the sample.
pub struct OutputDispatcher {
    sinks: Vec<RecordSink>,
    socket: Option<SocketSink>,
    plot: Box<dyn PlotSink + Send>,
    line: String,
}

impl OutputDispatcher {
    pub fn new() -> Self {
        OutputDispatcher {
            sinks: Vec::new(),
            socket: None,
            plot: Box::new(NoPlot),
            line: String::with_capacity(128),
        }
    }

    pub fn with_sink(mut self, sink: RecordSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_socket(mut self, socket: SocketSink) -> Self {
        self.socket = Some(socket);
        self
    }

    pub fn with_plot(mut self, plot: impl PlotSink + Send + 'static) -> Self {
        self.plot = Box::new(plot);
        self
    }

    /// True when at least one console/file sink is active
    pub fn has_record_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Optional `#comment` line, then the column header
    pub fn write_preamble(&mut self, first_line: Option<&str>) -> usize {
        let mut failures = 0;
        if let Some(text) = first_line {
            failures += self.broadcast(&format!("#{}", text));
        }
        failures + self.broadcast(HEADER)
    }

    /// Write one record to every sink; returns the number of failed sinks
    pub fn dispatch_record(&mut self, record: &SampleRecord<'_>) -> usize {
        if self.sinks.is_empty() {
            return 0;
        }

        use std::fmt::Write as _;
        self.line.clear();
        let _ = write!(self.line, "{}", record);
        let line = std::mem::take(&mut self.line);
        let failures = self.broadcast(&line);
        self.line = line;
        failures
    }

    /// Send an episode report to the socket peer, best effort
    pub fn dispatch_report(&mut self, report: &Report) -> bool {
        let Some(socket) = &self.socket else {
            return true;
        };

        match socket.send(report.wire_text()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Report {:?} not sent: {}", report.wire_text(), e);
                false
            }
        }
    }

    pub fn plot(&mut self, frame: &PlotFrame<'_>) {
        self.plot.on_sample_processed(frame);
    }

    /// Flush file/console sinks and release the socket writer
    pub fn close(&mut self) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush() {
                log::warn!("{}", e);
            }
        }
        self.socket = None;
    }

    pub fn sinks(&self) -> &[RecordSink] {
        &self.sinks
    }

    fn broadcast(&mut self, line: &str) -> usize {
        let mut failures = 0;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.write_line(line) {
                failures += 1;
                if sink.failures() == 1 {
                    log::warn!("{}", e);
                } else {
                    log::debug!("{}", e);
                }
            }
        }
        failures
    }
}

impl Default for OutputDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::record::NO_EVENT;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Writer that appends into shared memory
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that always fails
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken"))
        }
    }

    fn record() -> SampleRecord<'static> {
        SampleRecord {
            timestamp: 1.0,
            event: NO_EVENT,
            sensor_count: 42,
            filtered: 42.0,
            converted: 42.0,
            filtering: true,
            cutoff: 0.25,
            beta: 0.1,
        }
    }

    #[test]
    fn test_preamble_and_record() {
        let buf = SharedBuf::default();
        let mut dispatcher =
            OutputDispatcher::new().with_sink(RecordSink::from_writer("console", buf.clone()));

        assert_eq!(dispatcher.write_preamble(Some("run 1")), 0);
        assert_eq!(dispatcher.dispatch_record(&record()), 0);

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#run 1");
        assert_eq!(lines[1], HEADER);
        assert_eq!(lines[2], "1.0000,0,42,42.00000000,42.00000000,True,0.2500,0.1000");
    }

    #[test]
    fn test_failing_sink_does_not_block_other() {
        let buf = SharedBuf::default();
        let mut dispatcher = OutputDispatcher::new()
            .with_sink(RecordSink::from_writer("file", Broken))
            .with_sink(RecordSink::from_writer("console", buf.clone()));

        assert_eq!(dispatcher.dispatch_record(&record()), 1);
        assert_eq!(dispatcher.dispatch_record(&record()), 1);

        assert_eq!(buf.text().lines().count(), 2);
        assert_eq!(dispatcher.sinks()[0].failures(), 2);
        assert_eq!(dispatcher.sinks()[1].failures(), 0);
    }

    #[test]
    fn test_file_sink() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("session.csv");

        {
            let mut dispatcher = OutputDispatcher::new().with_sink(RecordSink::file(&path).unwrap());
            dispatcher.write_preamble(None);
            dispatcher.dispatch_record(&record());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with(HEADER));
    }

    #[test]
    fn test_no_sinks_is_a_no_op() {
        let mut dispatcher = OutputDispatcher::new();
        assert!(!dispatcher.has_record_sinks());
        assert_eq!(dispatcher.dispatch_record(&record()), 0);
        assert!(dispatcher.dispatch_report(&Report::NoTouch));
    }

    #[test]
    fn test_report_goes_to_socket_queue() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut dispatcher = OutputDispatcher::new().with_socket(SocketSink::new(tx));

        assert!(dispatcher.dispatch_report(&Report::Label {
            label: "3".to_string(),
            feature: 0.5,
        }));
        assert!(dispatcher.dispatch_report(&Report::NoTouch));

        assert_eq!(rx.try_recv().unwrap(), "3\n");
        assert_eq!(rx.try_recv().unwrap(), "0\n");
    }
}
