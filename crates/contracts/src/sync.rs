//! FrameBundle - Synchronizer output
//!
//! One payload per channel, all from the same simulator frame.

use crate::{FrameId, ImageData, SemanticPointCloud, SensorKind, SensorPacket, SensorPayload, WorldSnapshot};

/// Result of one synchronous world tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationStep {
    /// Frame id returned by the tick
    pub frame: FrameId,

    /// Simulated seconds advanced by the tick
    pub delta_seconds: f64,
}

/// Frame-consistent set of payloads
///
/// Packets are kept in channel order: index 0 is the world tick, the rest
/// follow sensor registration order.
#[derive(Debug, Clone)]
pub struct FrameBundle {
    frame: FrameId,
    packets: Vec<SensorPacket>,
}

impl FrameBundle {
    /// Build a bundle from packets already matched to `frame`
    ///
    /// # Panics
    /// Panics if any packet belongs to a different frame.
    pub fn new(frame: FrameId, packets: Vec<SensorPacket>) -> Self {
        assert!(
            packets.iter().all(|p| p.frame == frame),
            "all packets in a bundle must share frame {frame}"
        );
        Self { frame, packets }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Packets in channel order
    pub fn packets(&self) -> &[SensorPacket] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Simulation timestamp of the tick packet, falling back to the first packet
    pub fn timestamp(&self) -> f64 {
        self.world_snapshot()
            .map(|snapshot| snapshot.elapsed_seconds)
            .or_else(|| self.packets.first().map(|p| p.timestamp))
            .unwrap_or_default()
    }

    /// First packet of the given kind
    pub fn by_kind(&self, kind: SensorKind) -> Option<&SensorPacket> {
        self.packets.iter().find(|p| p.sensor_kind == kind)
    }

    pub fn world_snapshot(&self) -> Option<&WorldSnapshot> {
        self.packets.iter().find_map(|p| match &p.payload {
            SensorPayload::WorldSnapshot(snapshot) => Some(snapshot),
            _ => None,
        })
    }

    pub fn image(&self) -> Option<&ImageData> {
        self.packets.iter().find_map(|p| match &p.payload {
            SensorPayload::Image(image) => Some(image),
            _ => None,
        })
    }

    pub fn point_cloud(&self) -> Option<&SemanticPointCloud> {
        self.packets.iter().find_map(|p| match &p.payload {
            SensorPayload::SemanticPointCloud(cloud) => Some(cloud),
            _ => None,
        })
    }

    pub fn into_packets(self) -> Vec<SensorPacket> {
        self.packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(frame: FrameId) -> SensorPacket {
        SensorPacket {
            sensor_id: "world_tick".into(),
            sensor_kind: SensorKind::WorldTick,
            frame,
            timestamp: 2.5,
            payload: SensorPayload::WorldSnapshot(WorldSnapshot {
                frame,
                elapsed_seconds: 2.5,
                delta_seconds: 0.05,
                actors: vec![],
            }),
        }
    }

    fn lidar(frame: FrameId) -> SensorPacket {
        SensorPacket {
            sensor_id: "lidar".into(),
            sensor_kind: SensorKind::SemanticLidar,
            frame,
            timestamp: 2.5,
            payload: SensorPayload::SemanticPointCloud(SemanticPointCloud::default()),
        }
    }

    #[test]
    fn test_bundle_accessors() {
        let bundle = FrameBundle::new(7, vec![tick(7), lidar(7)]);
        assert_eq!(bundle.frame(), 7);
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.timestamp(), 2.5);
        assert!(bundle.world_snapshot().is_some());
        assert!(bundle.point_cloud().is_some());
        assert!(bundle.image().is_none());
        assert_eq!(bundle.packets()[0].sensor_kind, SensorKind::WorldTick);
    }

    #[test]
    #[should_panic]
    fn test_bundle_rejects_mixed_frames() {
        let _ = FrameBundle::new(7, vec![tick(7), lidar(8)]);
    }
}
