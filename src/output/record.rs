// Per-sample output record
// CSV line written to the console and file sinks

use std::fmt;

/// Column header written once per session
pub const HEADER: &str = "ts,event,sensorcount,filtpressure,rawpressure,filtering,cutoff,beta";

/// Event column value when no manual tag is set
pub const NO_EVENT: &str = "0";

/// One processed sample as it appears in the output log
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord<'a> {
    /// Seconds since the Unix epoch
    pub timestamp: f64,

    /// Manual event tag, or `NO_EVENT`
    pub event: &'a str,

    /// Raw integer reading from the transport
    pub sensor_count: i64,

    /// Adaptive filter output
    pub filtered: f64,

    /// Reading after unit conversion (or the raw count when conversion is off)
    pub converted: f64,

    /// Whether the plot/detector stream is filtered
    pub filtering: bool,

    pub cutoff: f64,
    pub beta: f64,
}

impl fmt::Display for SampleRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4},{},{},{:.8},{:.8},{},{:.4},{:.4}",
            self.timestamp,
            self.event,
            self.sensor_count,
            self.filtered,
            self.converted,
            if self.filtering { "True" } else { "False" },
            self.cutoff,
            self.beta,
        )
    }
}
