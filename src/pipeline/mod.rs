// Pipeline module
// Ingestion loop, operator control and episode trace

pub mod control;
pub mod session;
pub mod trace;

pub use control::{control_channel, spawn_stdin_reader, ControlCommand, ControlHandle, ControlReceiver, RunFlag};
pub use session::{Clock, Pipeline, Sample, SampleOutcome, Session, SessionStats};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceKind, TraceWriter};
