//! Ingestion Pipeline main entry

use std::collections::HashSet;
use std::sync::Arc;

use contracts::SensorSource;
use tracing::{debug, info, instrument};

use crate::channel::{ChannelAdapter, SensorChannel};
use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Ingestion Pipeline
///
/// Owns one unbounded channel per registered source. The world-tick source
/// is registered at construction so that it always sits at index 0.
pub struct IngestionPipeline {
    adapters: Vec<ChannelAdapter>,
    channels: Option<Vec<SensorChannel>>,
    metrics: Arc<IngestionMetrics>,
}

impl IngestionPipeline {
    pub fn new(tick_source: Box<dyn SensorSource>) -> Self {
        let (adapter, channel) = ChannelAdapter::new(0, tick_source);
        Self {
            adapters: vec![adapter],
            channels: Some(vec![channel]),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Register a sensor, returning its channel index
    #[instrument(
        name = "ingestion_register_sensor_source",
        skip(self, source),
        fields(sensor_id = %source.sensor_id())
    )]
    pub fn register_sensor_source(&mut self, source: Box<dyn SensorSource>) -> Result<usize> {
        let channels = self.channels.as_mut().ok_or(IngestionError::ChannelsTaken)?;
        if self.adapters.iter().any(|a| a.sensor_id() == source.sensor_id()) {
            return Err(IngestionError::DuplicateSensor {
                sensor_id: source.sensor_id().to_string(),
            });
        }

        let index = self.adapters.len();
        let (adapter, channel) = ChannelAdapter::new(index, source);
        debug!(index, "registered sensor source");
        self.adapters.push(adapter);
        channels.push(channel);
        Ok(index)
    }

    /// Start all registered sources
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.adapters.len(), "starting all sensor channels");
        for adapter in &self.adapters {
            adapter.start(self.metrics.clone());
        }
    }

    /// Stop all sources and close their channels
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.adapters.len(), "stopping all sensor channels");
        for adapter in &self.adapters {
            adapter.stop();
        }
    }

    /// Receiving ends, in registration order
    ///
    /// Note: Can only be called once, subsequent calls fail
    pub fn take_channels(&mut self) -> Result<Vec<SensorChannel>> {
        self.channels.take().ok_or(IngestionError::ChannelsTaken)
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Registered source count, world tick included
    pub fn sensor_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn sensor_ids(&self) -> HashSet<&str> {
        self.adapters.iter().map(ChannelAdapter::sensor_id).collect()
    }

    pub fn is_sensor_listening(&self, sensor_id: &str) -> bool {
        self.adapters
            .iter()
            .find(|a| a.sensor_id() == sensor_id)
            .is_some_and(ChannelAdapter::is_listening)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual::{ManualHandle, ManualSource};
    use contracts::{SensorKind, SensorPacket, SensorPayload, WorldSnapshot};

    fn packet(sensor_id: &str, kind: SensorKind, frame: u64) -> SensorPacket {
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

    fn pipeline() -> (IngestionPipeline, ManualHandle, ManualHandle) {
        let (tick, tick_handle) = ManualSource::new("world_tick", SensorKind::WorldTick);
        let (camera, camera_handle) = ManualSource::new("rgb", SensorKind::Camera);
        let mut pipeline = IngestionPipeline::new(Box::new(tick));
        assert_eq!(pipeline.register_sensor_source(Box::new(camera)).unwrap(), 1);
        (pipeline, tick_handle, camera_handle)
    }

    #[tokio::test]
    async fn test_channels_follow_registration_order() {
        let (mut pipeline, tick, camera) = pipeline();
        pipeline.start_all();
        let channels = pipeline.take_channels().unwrap();
        assert_eq!(channels[0].kind(), SensorKind::WorldTick);
        assert_eq!(channels[1].sensor_id(), "rgb");

        assert!(tick.push(packet("world_tick", SensorKind::WorldTick, 3)));
        assert!(camera.push(packet("rgb", SensorKind::Camera, 3)));
        assert_eq!(channels[0].recv().await.unwrap().frame, 3);
        assert_eq!(channels[1].recv().await.unwrap().frame, 3);
        assert_eq!(pipeline.metrics().snapshot().packets_received, 2);
    }

    #[test]
    fn test_take_channels_once() {
        let (mut pipeline, _, _) = pipeline();
        assert!(pipeline.take_channels().is_ok());
        assert!(matches!(
            pipeline.take_channels(),
            Err(IngestionError::ChannelsTaken)
        ));
    }

    #[test]
    fn test_duplicate_sensor_rejected() {
        let (mut pipeline, _, _) = pipeline();
        let (again, _) = ManualSource::new("rgb", SensorKind::Camera);
        assert!(matches!(
            pipeline.register_sensor_source(Box::new(again)),
            Err(IngestionError::DuplicateSensor { .. })
        ));
        assert_eq!(pipeline.sensor_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_closes_channels_after_draining() {
        let (mut pipeline, _, camera) = pipeline();
        pipeline.start_all();
        assert!(pipeline.is_sensor_listening("rgb"));
        let channels = pipeline.take_channels().unwrap();

        camera.push(packet("rgb", SensorKind::Camera, 1));
        pipeline.stop_all();
        assert!(!pipeline.is_sensor_listening("rgb"));
        assert!(!camera.push(packet("rgb", SensorKind::Camera, 2)));

        assert_eq!(channels[1].recv().await.unwrap().frame, 1);
        assert!(matches!(
            channels[1].recv().await,
            Err(IngestionError::ChannelClosed { .. })
        ));
    }
}
