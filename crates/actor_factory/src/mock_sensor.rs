//! Mock sensor implementation
//!
//! Implements `SensorSource` on top of a listener slot that `MockSimulator`
//! fires from `tick()`, mirroring how CARLA invokes sensor callbacks once per
//! world step in synchronous mode. Also builds the simulated payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use contracts::{
    ActorId, ImageData, ImageFormat, Location, SemanticLidarPoint, SemanticPointCloud,
    SensorDataCallback, SensorKind, SensorPacket, SensorSource,
};
use tracing::{debug, trace};

/// Semantic tag CARLA assigns to vehicles
pub const VEHICLE_TAG: u32 = 10;

/// Semantic tag CARLA assigns to road surface
pub const ROAD_TAG: u32 = 7;

/// Callback holder shared between a sensor handle and the simulator
#[derive(Default)]
pub struct ListenerSlot {
    listening: AtomicBool,
    callback: Mutex<Option<SensorDataCallback>>,
}

impl ListenerSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Deliver a packet if a callback is registered
    pub fn deliver(&self, packet: SensorPacket) -> bool {
        if !self.is_listening() {
            return false;
        }
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(packet);
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach(&self, callback: SensorDataCallback) -> bool {
        if self.listening.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        true
    }

    pub(crate) fn detach(&self) {
        self.listening.store(false, Ordering::SeqCst);
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Mock sensor
///
/// Data is pushed by `MockSimulator::tick` through the shared slot, on the
/// caller's thread, consistent with real CARLA sensor behavior in
/// synchronous mode.
pub struct MockSensor {
    sensor_id: String,
    sensor_kind: SensorKind,
    slot: Arc<ListenerSlot>,
}

impl MockSensor {
    pub fn new(sensor_id: String, sensor_kind: SensorKind, slot: Arc<ListenerSlot>) -> Self {
        Self {
            sensor_id,
            sensor_kind,
            slot,
        }
    }
}

impl SensorSource for MockSensor {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn sensor_kind(&self) -> SensorKind {
        self.sensor_kind
    }

    fn listen(&self, callback: SensorDataCallback) {
        let sensor_id = self.sensor_id.clone();
        let tagged: SensorDataCallback = Arc::new(move |mut packet: SensorPacket| {
            packet.sensor_id.clone_from(&sensor_id);
            callback(packet);
        });
        if self.slot.attach(tagged) {
            debug!(sensor_id = %self.sensor_id, sensor_kind = ?self.sensor_kind, "mock sensor started");
        } else {
            trace!(sensor_id = %self.sensor_id, "mock sensor already listening");
        }
    }

    fn stop(&self) {
        self.slot.detach();
        debug!(sensor_id = %self.sensor_id, "mock sensor stopped");
    }

    fn is_listening(&self) -> bool {
        self.slot.is_listening()
    }
}

/// Camera image filled with a frame-dependent gray level
pub fn mock_image(width: u32, height: u32, fov: f64, frame: u64) -> ImageData {
    let shade = (frame % 200) as u8 + 30;
    let pixels = width as usize * height as usize;
    let mut data = Vec::with_capacity(pixels * 4);
    for _ in 0..pixels {
        data.extend_from_slice(&[shade, shade, shade, 255]);
    }
    ImageData {
        width,
        height,
        fov,
        format: ImageFormat::Bgra8,
        data: Bytes::from(data),
    }
}

/// A vehicle as seen by the mock LiDAR
#[derive(Debug, Clone, Copy)]
pub struct LidarTarget {
    pub actor_id: ActorId,

    /// Box center in world coordinates
    pub center: Location,

    /// Box half sizes
    pub extent: Location,
}

/// Semantic point cloud with `hits_per_target` points on every target in range
///
/// Points are expressed relative to `sensor` (the mock keeps every actor at
/// zero rotation). A ring of road points is added so that not every point
/// belongs to a vehicle.
pub fn mock_point_cloud(
    sensor: Location,
    targets: &[LidarTarget],
    hits_per_target: u32,
    range: f64,
) -> SemanticPointCloud {
    let mut points = Vec::new();

    for target in targets {
        if sensor.distance(&target.center) > range {
            continue;
        }
        for i in 0..hits_per_target {
            // deterministic spread over the box's near face
            let fy = ((i % 7) as f64 / 6.0) * 2.0 - 1.0;
            let fz = ((i / 7 % 5) as f64 / 4.0) * 2.0 - 1.0;
            points.push(SemanticLidarPoint {
                x: (target.center.x - target.extent.x - sensor.x) as f32,
                y: (target.center.y + fy * target.extent.y - sensor.y) as f32,
                z: (target.center.z + fz * target.extent.z - sensor.z) as f32,
                cos_inc_angle: 1.0,
                object_idx: target.actor_id,
                object_tag: VEHICLE_TAG,
            });
        }
    }

    for i in 0..16 {
        let angle = i as f64 / 16.0 * std::f64::consts::TAU;
        points.push(SemanticLidarPoint {
            x: (5.0 * angle.cos()) as f32,
            y: (5.0 * angle.sin()) as f32,
            z: -(sensor.z as f32),
            cos_inc_angle: 0.5,
            object_idx: 0,
            object_tag: ROAD_TAG,
        });
    }

    SemanticPointCloud {
        horizontal_angle: std::f64::consts::TAU,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorPayload;
    use std::sync::atomic::AtomicU64;

    fn packet(frame: u64) -> SensorPacket {
        SensorPacket {
            sensor_id: "rgb".into(),
            sensor_kind: SensorKind::Camera,
            frame,
            timestamp: 0.0,
            payload: SensorPayload::Image(mock_image(2, 2, 90.0, frame)),
        }
    }

    #[test]
    fn test_slot_delivers_only_while_listening() {
        let slot = ListenerSlot::new();
        let sensor = MockSensor::new("rgb".into(), SensorKind::Camera, slot.clone());
        assert!(!slot.deliver(packet(1)));

        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        sensor.listen(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        }));
        assert!(sensor.is_listening());
        assert!(slot.deliver(packet(2)));

        sensor.stop();
        assert!(!sensor.is_listening());
        assert!(!slot.deliver(packet(3)));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_idempotent_listen() {
        let slot = ListenerSlot::new();
        let sensor = MockSensor::new("rgb".into(), SensorKind::Camera, slot.clone());

        let count = Arc::new(AtomicU64::new(0));
        let first = count.clone();
        let second = count.clone();
        sensor.listen(Arc::new(move |_| {
            first.fetch_add(1, Ordering::Relaxed);
        }));
        sensor.listen(Arc::new(move |_| {
            second.fetch_add(100, Ordering::Relaxed);
        }));

        slot.deliver(packet(1));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_point_cloud_hits_targets_in_range() {
        let sensor = Location {
            x: 0.0,
            y: 0.0,
            z: 2.4,
        };
        let near = LidarTarget {
            actor_id: 7,
            center: Location {
                x: 20.0,
                y: 0.0,
                z: 0.8,
            },
            extent: Location {
                x: 2.3,
                y: 1.0,
                z: 0.8,
            },
        };
        let far = LidarTarget {
            actor_id: 8,
            center: Location {
                x: 500.0,
                y: 0.0,
                z: 0.8,
            },
            ..near
        };
        let cloud = mock_point_cloud(sensor, &[near, far], 30, 100.0);
        assert_eq!(cloud.hits_on(7), 30);
        assert_eq!(cloud.hits_on(8), 0);
        assert_eq!(cloud.hits_on(0), 16);
    }

    #[test]
    fn test_mock_image_size() {
        let image = mock_image(4, 3, 90.0, 5);
        assert_eq!(image.data.len(), 4 * 3 * 4);
        assert_eq!(image.format, ImageFormat::Bgra8);
    }
}
