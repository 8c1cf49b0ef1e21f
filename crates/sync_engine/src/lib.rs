//! # Sync Engine
//!
//! Frame-exact synchronization for the synchronous-mode acquisition loop.
//!
//! Responsibilities:
//! - Pull one payload per channel for a simulator frame, dropping stale ones
//! - Skip the step when any channel stays empty past the timeout
//! - Gate collection to once per capture interval of simulated time
//!
//! ## Usage Example
//!
//! ```ignore
//! use sync_engine::{CaptureScheduler, FrameSynchronizer, SyncOutcome};
//!
//! let mut scheduler = CaptureScheduler::new(1.0, 100);
//! let mut synchronizer = FrameSynchronizer::new(channels, Duration::from_secs(1));
//!
//! let step = client.tick().await?;
//! if scheduler.advance(step.delta_seconds) {
//!     if let SyncOutcome::Complete { bundle, .. } = synchronizer.collect(step.frame).await {
//!         // annotate and commit
//!         scheduler.record_capture();
//!     }
//! }
//! ```

mod scheduler;
mod synchronizer;

pub use contracts::{FrameBundle, SimulationStep};
pub use scheduler::{CaptureScheduler, CAPTURE_TOLERANCE};
pub use synchronizer::{FrameSynchronizer, SyncOutcome};
