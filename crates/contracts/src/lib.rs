//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the collector workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - The simulator's frame id (`FrameId`) is the primary clock: one id per world tick.
//! - Simulated seconds (`f64`) are only used for capture cadence and timestamps.

mod annotator;
mod blueprint;
mod detection;
mod error;
mod registry;
mod runtime;
mod sensor;
mod sensor_source;
mod sink;
mod sync;
mod vehicle;

pub use annotator::*;
pub use blueprint::*;
pub use detection::*;
pub use error::*;
pub use registry::*;
pub use runtime::*;
pub use sensor::*;
pub use sensor_source::{SensorDataCallback, SensorSource};
pub use sink::*;
pub use sync::*;
pub use vehicle::*;
