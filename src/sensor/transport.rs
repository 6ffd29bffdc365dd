// Sensor line transport
// Reads newline-delimited integer readings from a serial port or a capture file

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

use serialport::SerialPort;
use thiserror::Error;

/// Read timeout for the serial port; bounds how long a quit request can wait
const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest line accepted before it is discarded as garbage
const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open serial port {port} @ {baud}: {source}")]
    Open {
        port: String,
        baud: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to open replay file: {0}")]
    Replay(#[source] io::Error),

    #[error("Transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport closed")]
    Closed,
}

/// A reading line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bad line: [{line}]")]
pub struct ParseError {
    pub line: String,
}

/// Outcome of a single read attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without its terminator
    Line(String),

    /// Nothing arrived before the read timeout
    Idle,

    /// The source is exhausted (replay only)
    Eof,
}

/// Line-oriented source of sensor readings
pub trait LineSource {
    /// Read the next line; blocks at most for the source's timeout
    fn read_line(&mut self) -> Result<LineRead, TransportError>;
}

/// Parse one transport line as a base-10 integer reading
pub fn parse_reading(line: &str) -> Result<i64, ParseError> {
    line.trim().parse::<i64>().map_err(|_| ParseError {
        line: line.trim().to_string(),
    })
}

/// Serial port transport with "read one line" semantics
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate
    pub fn open(port: &str, baud: u32) -> Result<Self, TransportError> {
        let serial = serialport::new(port, baud)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Open {
                port: port.to_string(),
                baud,
                source,
            })?;

        log::info!("Opened serial port {} @ {} baud", port, baud);

        Ok(SerialTransport::from_port(serial))
    }

    /// Wrap an already opened port
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        SerialTransport {
            port,
            pending: Vec::with_capacity(MAX_LINE_LEN),
        }
    }
}

impl LineSource for SerialTransport {
    fn read_line(&mut self) -> Result<LineRead, TransportError> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => {
                    if byte[0] == b'\n' {
                        let line = String::from_utf8_lossy(&self.pending).into_owned();
                        self.pending.clear();
                        return Ok(LineRead::Line(line));
                    }
                    if self.pending.len() >= MAX_LINE_LEN {
                        log::warn!("Discarding {} bytes without a line break", self.pending.len());
                        self.pending.clear();
                    }
                    self.pending.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(LineRead::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

/// Replays captured readings from any buffered reader
pub struct ReplayTransport<R> {
    reader: R,
}

impl ReplayTransport<BufReader<File>> {
    /// Open a capture file with one reading per line
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let file = File::open(path).map_err(TransportError::Replay)?;
        log::info!("Replaying readings from {}", path.display());
        Ok(ReplayTransport::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplayTransport<R> {
    pub fn new(reader: R) -> Self {
        ReplayTransport { reader }
    }
}

impl<R: BufRead> LineSource for ReplayTransport<R> {
    fn read_line(&mut self) -> Result<LineRead, TransportError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(LineRead::Eof);
        }
        Ok(LineRead::Line(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
