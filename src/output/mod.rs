// Output module
// Record formatting, sink dispatch, socket reports and plot observer

pub mod dispatcher;
pub mod plot;
pub mod record;
pub mod socket;

pub use dispatcher::{OutputDispatcher, RecordSink, SinkError};
pub use plot::{NoPlot, PlotFrame, PlotSink, SparklinePlot};
pub use record::{SampleRecord, HEADER, NO_EVENT};
pub use socket::{accept_peer, spawn_writer, SocketSink};
