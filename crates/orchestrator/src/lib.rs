//! # Orchestrator
//!
//! Drives one acquisition session: world preparation, actor spawning, sensor
//! wiring, the synchronous step/collect/commit loop, and the cleanup that runs
//! on every exit path.

pub mod error;
pub mod session;
pub mod signal;

pub use error::{OrchestratorError, Result};
pub use session::{AcquisitionSession, ExitReason, ProgressFn, SessionReport};
pub use signal::shutdown_signal;
