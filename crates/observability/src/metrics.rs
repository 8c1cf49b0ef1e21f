//! Collector metrics
//!
//! Thin wrappers over the `metrics` facade plus an in-memory [`RunStats`]
//! aggregator for the end-of-run summary.

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// One world step was taken
pub fn record_step(frame: u64) {
    counter!("carla_collector_steps_total").increment(1);
    gauge!("carla_collector_last_frame_id").set(frame as f64);
}

/// A bundle was accepted and committed
pub fn record_capture(captured: u64) {
    counter!("carla_collector_captures_total").increment(1);
    gauge!("carla_collector_captured_frames").set(captured as f64);
}

/// A due step was skipped because some channels produced nothing in time
pub fn record_sync_timeout(missing: &[String]) {
    counter!("carla_collector_sync_timeouts_total").increment(1);
    for sensor_id in missing {
        counter!("carla_collector_sensor_missing_total", "sensor_id" => sensor_id.clone())
            .increment(1);
    }
}

/// Payloads dropped because they carried another frame id
pub fn record_stale_payloads(count: usize) {
    if count > 0 {
        counter!("carla_collector_stale_payloads_total").increment(count as u64);
    }
}

/// Time spent collecting one step's payloads
pub fn record_collect_latency_ms(latency_ms: f64) {
    histogram!("carla_collector_collect_latency_ms").record(latency_ms);
}

/// Annotation outcome of one frame
pub fn record_detections(accepted: usize, filtered: usize) {
    counter!("carla_collector_detections_accepted_total").increment(accepted as u64);
    counter!("carla_collector_detections_filtered_total").increment(filtered as u64);
    histogram!("carla_collector_detections_per_frame").record(accepted as f64);
}

/// One sink write attempt
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "carla_collector_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// In-memory run statistics
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub steps: u64,
    pub captures: u64,
    pub sync_timeouts: u64,
    pub stale_payloads: u64,
    pub detections_accepted: u64,
    pub detections_filtered: u64,
    pub sink_failures: u64,

    /// Collection latency per due step (ms)
    pub collect_latency: RunningStats,

    /// Accepted detections per captured frame
    pub detections_per_frame: RunningStats,

    /// Timeouts per sensor id
    pub missing_counts: BTreeMap<String, u64>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step(&mut self) {
        self.steps += 1;
    }

    pub fn on_collect(&mut self, stale: usize, latency_ms: f64) {
        self.stale_payloads += stale as u64;
        self.collect_latency.push(latency_ms);
    }

    pub fn on_timeout(&mut self, missing: &[String]) {
        self.sync_timeouts += 1;
        for sensor_id in missing {
            *self.missing_counts.entry(sensor_id.clone()).or_insert(0) += 1;
        }
    }

    pub fn on_capture(&mut self, accepted: usize, filtered: usize) {
        self.captures += 1;
        self.detections_accepted += accepted as u64;
        self.detections_filtered += filtered as u64;
        self.detections_per_frame.push(accepted as f64);
    }

    pub fn on_sink_failure(&mut self) {
        self.sink_failures += 1;
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            steps: self.steps,
            captures: self.captures,
            sync_timeouts: self.sync_timeouts,
            stale_payloads: self.stale_payloads,
            detections_accepted: self.detections_accepted,
            detections_filtered: self.detections_filtered,
            sink_failures: self.sink_failures,
            timeout_rate: if self.captures + self.sync_timeouts > 0 {
                self.sync_timeouts as f64 / (self.captures + self.sync_timeouts) as f64 * 100.0
            } else {
                0.0
            },
            collect_latency_ms: StatsSummary::from(&self.collect_latency),
            detections_per_frame: StatsSummary::from(&self.detections_per_frame),
            missing_counts: self.missing_counts.clone(),
        }
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub steps: u64,
    pub captures: u64,
    pub sync_timeouts: u64,
    pub stale_payloads: u64,
    pub detections_accepted: u64,
    pub detections_filtered: u64,
    pub sink_failures: u64,
    /// Share of due steps that timed out (%)
    pub timeout_rate: f64,
    pub collect_latency_ms: StatsSummary,
    pub detections_per_frame: StatsSummary,
    pub missing_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Collection Summary ===")?;
        writeln!(f, "World steps: {}", self.steps)?;
        writeln!(f, "Captured frames: {}", self.captures)?;
        writeln!(
            f,
            "Sync timeouts: {} ({:.2}%)",
            self.sync_timeouts, self.timeout_rate
        )?;
        writeln!(f, "Stale payloads dropped: {}", self.stale_payloads)?;
        writeln!(
            f,
            "Detections: {} accepted, {} filtered",
            self.detections_accepted, self.detections_filtered
        )?;
        writeln!(f, "Detections per frame: {}", self.detections_per_frame)?;
        writeln!(f, "Collect latency (ms): {}", self.collect_latency_ms)?;
        if self.sink_failures > 0 {
            writeln!(f, "Sink failures: {}", self.sink_failures)?;
        }

        if !self.missing_counts.is_empty() {
            writeln!(f, "Missing sensor counts:")?;
            for (sensor, count) in &self.missing_counts {
                writeln!(f, "  {}: {}", sensor, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
