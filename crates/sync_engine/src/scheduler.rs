//! Capture cadence in simulated time

use tracing::trace;

/// Slack for floating-point accumulation (20 × 0.05 s counts as 1.0 s)
pub const CAPTURE_TOLERANCE: f64 = 1e-9;

/// Gates the expensive collection path to once per capture interval
///
/// The accumulator only resets after a committed capture; a timed-out step
/// leaves it untouched so the next step retries.
#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    interval: f64,
    max_frames: u64,
    accumulated: f64,
    captured: u64,
}

impl CaptureScheduler {
    pub fn new(interval: f64, max_frames: u64) -> Self {
        Self {
            interval,
            max_frames,
            accumulated: 0.0,
            captured: 0,
        }
    }

    /// Add one step's simulated time; returns whether a capture is due
    pub fn advance(&mut self, delta_seconds: f64) -> bool {
        self.accumulated += delta_seconds;
        let due = self.is_due();
        trace!(accumulated = self.accumulated, due, "capture scheduler advanced");
        due
    }

    pub fn is_due(&self) -> bool {
        self.accumulated + CAPTURE_TOLERANCE >= self.interval
    }

    /// Reset the accumulator and count one output frame, returning the new count
    pub fn record_capture(&mut self) -> u64 {
        self.accumulated = 0.0;
        self.captured += 1;
        self.captured
    }

    /// `max_frames` captures committed
    pub fn is_finished(&self) -> bool {
        self.captured >= self.max_frames
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn remaining(&self) -> u64 {
        self.max_frames.saturating_sub(self.captured)
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn max_frames(&self) -> u64 {
        self.max_frames
    }
}
