//! Sink implementations
//!
//! Contains LogSink, SidecarSink, and DarknetSink.

mod darknet;
mod log;
mod sidecar;

pub use self::darknet::{DarknetSink, DarknetSinkConfig};
pub use self::log::LogSink;
pub use self::sidecar::{SidecarSink, SidecarSinkConfig};
