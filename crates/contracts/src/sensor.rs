//! SensorPacket - Ingestion output
//!
//! Raw per-sensor payloads as delivered by simulator callbacks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ActorId, FrameId, SensorKind, Transform};

/// Sensor data packet
///
/// One payload produced by one sensor (or the world-tick pseudo-sensor)
/// for exactly one simulator frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPacket {
    /// Sensor ID (config id, `"world_tick"` for the tick pseudo-sensor)
    pub sensor_id: String,

    /// Sensor kind
    pub sensor_kind: SensorKind,

    /// Frame the payload was produced for
    pub frame: FrameId,

    /// Simulation timestamp (seconds)
    pub timestamp: f64,

    /// Data payload
    pub payload: SensorPayload,
}

/// Sensor data payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorPayload {
    /// World snapshot delivered by the tick listener
    WorldSnapshot(WorldSnapshot),

    /// Camera image
    Image(ImageData),

    /// Semantic LiDAR point cloud
    SemanticPointCloud(SemanticPointCloud),
}

impl SensorPayload {
    /// Payload kind name, used in logs and errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::WorldSnapshot(_) => "world_snapshot",
            Self::Image(_) => "image",
            Self::SemanticPointCloud(_) => "semantic_point_cloud",
        }
    }
}

/// World state at one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Frame id of the snapshot
    pub frame: FrameId,

    /// Elapsed simulation time (seconds)
    pub elapsed_seconds: f64,

    /// Simulated time advanced by the tick that produced this snapshot
    pub delta_seconds: f64,

    /// Per-actor state
    pub actors: Vec<ActorSnapshot>,
}

impl WorldSnapshot {
    /// Find one actor's state
    pub fn find(&self, actor_id: ActorId) -> Option<&ActorSnapshot> {
        self.actors.iter().find(|actor| actor.id == actor_id)
    }
}

/// Actor state inside a [`WorldSnapshot`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,

    /// World pose
    pub transform: Transform,

    /// Velocity (m/s)
    pub velocity: Vector3,
}

/// Image data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32,

    /// Horizontal field of view (degrees)
    pub fov: f64,

    /// Pixel format
    pub format: ImageFormat,

    /// Raw pixel data
    pub data: Bytes,
}

/// Image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Rgb8,
    Rgba8,
    Bgra8,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }
}

/// Semantic LiDAR point cloud
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticPointCloud {
    /// Horizontal angle of the last point (radians)
    pub horizontal_angle: f64,

    /// Detections, in sensor-local coordinates
    pub points: Vec<SemanticLidarPoint>,
}

impl SemanticPointCloud {
    /// Number of points that hit the given actor
    pub fn hits_on(&self, actor_id: ActorId) -> usize {
        self.points
            .iter()
            .filter(|point| point.object_idx == actor_id)
            .count()
    }
}

/// One semantic LiDAR detection
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SemanticLidarPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,

    /// Cosine of the incident angle
    pub cos_inc_angle: f32,

    /// Id of the actor that was hit (0 for static geometry)
    pub object_idx: ActorId,

    /// Semantic tag of the hit object
    pub object_tag: u32,
}

/// 3D vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(object_idx: ActorId) -> SemanticLidarPoint {
        SemanticLidarPoint {
            x: 1.0,
            y: 0.0,
            z: 0.0,
            cos_inc_angle: 1.0,
            object_idx,
            object_tag: 10,
        }
    }

    #[test]
    fn test_hits_on_counts_matching_points() {
        let cloud = SemanticPointCloud {
            horizontal_angle: 0.0,
            points: vec![point(5), point(5), point(6), point(0)],
        };
        assert_eq!(cloud.hits_on(5), 2);
        assert_eq!(cloud.hits_on(6), 1);
        assert_eq!(cloud.hits_on(7), 0);
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(ImageFormat::Bgra8.bytes_per_pixel(), 4);
        assert_eq!(ImageFormat::Rgb8.bytes_per_pixel(), 3);
    }
}
