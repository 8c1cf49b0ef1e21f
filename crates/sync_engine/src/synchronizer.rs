//! Frame synchronizer
//!
//! Per due step, pulls exactly one payload per channel for the step's frame.
//! A step either yields a complete `FrameBundle` or is skipped; partial
//! bundles are never emitted.

use std::time::{Duration, Instant};

use contracts::{FrameBundle, FrameId, SensorPacket};
use ingestion::SensorChannel;
use observability::metrics;
use tracing::{debug, instrument, trace, warn};

/// Result of collecting one frame
#[derive(Debug)]
pub enum SyncOutcome {
    /// Every channel produced a payload for the frame
    Complete { bundle: FrameBundle, stale: usize },

    /// At least one channel produced nothing before the timeout
    TimedOut {
        frame: FrameId,
        /// Sensor ids of every channel that came up empty
        missing: Vec<String>,
        stale: usize,
    },
}

impl SyncOutcome {
    pub fn frame(&self) -> FrameId {
        match self {
            Self::Complete { bundle, .. } => bundle.frame(),
            Self::TimedOut { frame, .. } => *frame,
        }
    }

    /// Payloads dropped because they belonged to another frame
    pub fn stale(&self) -> usize {
        match self {
            Self::Complete { stale, .. } | Self::TimedOut { stale, .. } => *stale,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Matches channel payloads to simulator frames
pub struct FrameSynchronizer {
    channels: Vec<SensorChannel>,
    timeout: Duration,
}

impl FrameSynchronizer {
    /// `channels` in registration order, world tick first
    pub fn new(channels: Vec<SensorChannel>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collect one payload per channel for `frame`
    ///
    /// Every channel is drained for the frame even after another one came up
    /// empty, so a timeout reports all missing channels at once.
    #[instrument(name = "frame_synchronizer_collect", skip(self), fields(channels = self.channels.len()))]
    pub async fn collect(&mut self, frame: FrameId) -> SyncOutcome {
        let started = Instant::now();
        let mut packets = Vec::with_capacity(self.channels.len());
        let mut missing = Vec::new();
        let mut stale = 0;

        for channel in &self.channels {
            match Self::pop_frame(channel, frame, self.timeout, &mut stale).await {
                Some(packet) => packets.push(packet),
                None => missing.push(channel.sensor_id().to_string()),
            }
        }

        metrics::record_collect_latency_ms(started.elapsed().as_secs_f64() * 1000.0);
        metrics::record_stale_payloads(stale);

        if missing.is_empty() {
            debug!(frame, stale, "frame complete");
            SyncOutcome::Complete {
                bundle: FrameBundle::new(frame, packets),
                stale,
            }
        } else {
            warn!(frame, ?missing, stale, "sensor data missing, skipping step");
            metrics::record_sync_timeout(&missing);
            SyncOutcome::TimedOut {
                frame,
                missing,
                stale,
            }
        }
    }

    /// Pop until a payload for `frame` shows up; other frames are discarded
    ///
    /// Each pop waits at most `timeout`. A closed channel counts as empty.
    async fn pop_frame(
        channel: &SensorChannel,
        frame: FrameId,
        timeout: Duration,
        stale: &mut usize,
    ) -> Option<SensorPacket> {
        loop {
            match tokio::time::timeout(timeout, channel.recv()).await {
                Ok(Ok(packet)) if packet.frame == frame => return Some(packet),
                Ok(Ok(packet)) => {
                    *stale += 1;
                    trace!(
                        sensor_id = channel.sensor_id(),
                        expected = frame,
                        got = packet.frame,
                        "dropping stale payload"
                    );
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "channel closed while collecting");
                    return None;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorKind, SensorPayload, WorldSnapshot};
    use ingestion::{IngestionPipeline, ManualHandle, ManualSource};

    fn packet(sensor_id: &str, kind: SensorKind, frame: FrameId) -> SensorPacket {
        SensorPacket {
            sensor_id: sensor_id.into(),
            sensor_kind: kind,
            frame,
            timestamp: frame as f64 * 0.05,
            payload: SensorPayload::WorldSnapshot(WorldSnapshot {
                frame,
                ..Default::default()
            }),
        }
    }

    struct Rig {
        // keeps the sources alive
        _pipeline: IngestionPipeline,
        tick: ManualHandle,
        camera: ManualHandle,
        lidar: ManualHandle,
        synchronizer: FrameSynchronizer,
    }

    impl Rig {
        fn new() -> Self {
            let (tick_source, tick) = ManualSource::new("world_tick", SensorKind::WorldTick);
            let (camera_source, camera) = ManualSource::new("rgb", SensorKind::Camera);
            let (lidar_source, lidar) = ManualSource::new("lidar", SensorKind::SemanticLidar);
            let mut pipeline = IngestionPipeline::new(Box::new(tick_source));
            pipeline.register_sensor_source(Box::new(camera_source)).unwrap();
            pipeline.register_sensor_source(Box::new(lidar_source)).unwrap();
            pipeline.start_all();
            let channels = pipeline.take_channels().unwrap();
            Self {
                _pipeline: pipeline,
                tick,
                camera,
                lidar,
                synchronizer: FrameSynchronizer::new(channels, Duration::from_millis(50)),
            }
        }

        fn deliver_all(&self, frame: FrameId) {
            self.tick.push(packet("world_tick", SensorKind::WorldTick, frame));
            self.camera.push(packet("rgb", SensorKind::Camera, frame));
            self.lidar.push(packet("lidar", SensorKind::SemanticLidar, frame));
        }
    }

    #[tokio::test]
    async fn test_complete_bundle_shares_frame() {
        let mut rig = Rig::new();
        rig.deliver_all(7);

        let outcome = rig.synchronizer.collect(7).await;
        let SyncOutcome::Complete { bundle, stale } = outcome else {
            panic!("expected complete bundle");
        };
        assert_eq!(stale, 0);
        assert_eq!(bundle.len(), 3);
        assert!(bundle.packets().iter().all(|p| p.frame == 7));
        assert_eq!(bundle.packets()[0].sensor_kind, SensorKind::WorldTick);
    }

    #[tokio::test]
    async fn test_stale_payloads_are_discarded() {
        let mut rig = Rig::new();
        for frame in 1..=4 {
            rig.deliver_all(frame);
        }

        let outcome = rig.synchronizer.collect(4).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.stale(), 9);
    }

    #[tokio::test]
    async fn test_missing_channel_skips_step() {
        let mut rig = Rig::new();
        rig.tick.push(packet("world_tick", SensorKind::WorldTick, 2));
        rig.lidar.push(packet("lidar", SensorKind::SemanticLidar, 2));

        let outcome = rig.synchronizer.collect(2).await;
        let SyncOutcome::TimedOut { frame, missing, .. } = outcome else {
            panic!("expected timeout");
        };
        assert_eq!(frame, 2);
        assert_eq!(missing, vec!["rgb".to_string()]);

        // the next step recovers
        rig.deliver_all(3);
        assert!(rig.synchronizer.collect(3).await.is_complete());
    }

    #[tokio::test]
    async fn test_every_missing_channel_is_reported() {
        let mut rig = Rig::new();
        rig.tick.push(packet("world_tick", SensorKind::WorldTick, 5));
        rig.camera.push(packet("rgb", SensorKind::Camera, 4));

        let outcome = rig.synchronizer.collect(5).await;
        let SyncOutcome::TimedOut { missing, stale, .. } = outcome else {
            panic!("expected timeout");
        };
        assert_eq!(missing, vec!["rgb".to_string(), "lidar".to_string()]);
        assert_eq!(stale, 1);
    }
}
