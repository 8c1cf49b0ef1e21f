//! CARLA `SensorSource` wrappers
//!
//! Only compiled when `real-carla` feature is enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use carla::client::Sensor;
use contracts::{SensorDataCallback, SensorKind, SensorSource};
use tracing::{debug, trace, warn};

use crate::mock_client::WORLD_TICK_ID;
use crate::mock_sensor::ListenerSlot;
use crate::sensor_data_converter::convert_sensor_data;

/// CARLA sensor wrapper
///
/// Lets the ingestion pipeline treat real and mock sensors uniformly.
pub struct CarlaSensorSource {
    sensor_id: String,
    sensor_kind: SensorKind,
    fov: f64,
    sensor: Sensor,
    listening: Arc<AtomicBool>,
}

impl CarlaSensorSource {
    pub fn new(sensor_id: String, sensor_kind: SensorKind, fov: f64, sensor: Sensor) -> Self {
        Self {
            sensor_id,
            sensor_kind,
            fov,
            sensor,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SensorSource for CarlaSensorSource {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn sensor_kind(&self) -> SensorKind {
        self.sensor_kind
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!(sensor_id = %self.sensor_id, "sensor already listening");
            return;
        }

        let sensor_id = self.sensor_id.clone();
        let sensor_kind = self.sensor_kind;
        let fov = self.fov;
        let listening = self.listening.clone();

        debug!(sensor_id = %sensor_id, sensor_kind = ?sensor_kind, "starting CARLA sensor");

        self.sensor.listen(move |sensor_data| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }
            match convert_sensor_data(&sensor_id, sensor_kind, fov, &sensor_data) {
                Some(packet) => {
                    trace!(sensor_id = %sensor_id, frame = packet.frame, "CARLA sensor data received");
                    callback(packet);
                }
                None => trace!(sensor_id = %sensor_id, "failed to convert sensor data"),
            }
        });
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(sensor_id = %self.sensor_id, "stopping CARLA sensor");
            self.sensor.stop();
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

/// World-tick listener fed by `RealCarlaClient::tick`
pub struct CarlaTickSource {
    slot: Arc<ListenerSlot>,
}

impl CarlaTickSource {
    pub fn new(slot: Arc<ListenerSlot>) -> Self {
        Self { slot }
    }
}

impl SensorSource for CarlaTickSource {
    fn sensor_id(&self) -> &str {
        WORLD_TICK_ID
    }

    fn sensor_kind(&self) -> SensorKind {
        SensorKind::WorldTick
    }

    fn listen(&self, callback: SensorDataCallback) {
        if !self.slot.attach(callback) {
            warn!("world tick already listening");
        }
    }

    fn stop(&self) {
        self.slot.detach();
    }

    fn is_listening(&self) -> bool {
        self.slot.is_listening()
    }
}
