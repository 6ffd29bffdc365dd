// Sensor input module
// Serial line transport and raw reading conversion

pub mod transport;
pub mod units;

pub use transport::{
    parse_reading, LineRead, LineSource, ParseError, ReplayTransport, SerialTransport,
    TransportError,
};
pub use units::{raw_to_hectopascal, AnalogSensor};
