//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every channel callback
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Payloads handed to a channel
    pub packets_received: AtomicU64,

    /// Payloads delivered after their channel was closed
    pub packets_rejected: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, sensor_id: &str) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("carla_collector_packets_received_total", "sensor" => sensor_id.to_string())
            .increment(1);
    }

    pub fn record_rejected(&self) {
        self.packets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_rejected: self.packets_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_rejected: u64,
}
