// Signal processing module
// Adaptive filtering, bounded sample history and window statistics

pub mod filter;
pub mod ring;
pub mod stats;

pub use filter::{FilterConfig, FilterParams, OneEuroFilter};
pub use ring::RingBuffer;
