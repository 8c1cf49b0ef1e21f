//! SensorSource trait - Sensor data source abstraction
//!
//! Unifies real simulator sensors, the world-tick listener and mock sensors
//! behind one callback-based interface.

use std::sync::Arc;

use crate::{SensorKind, SensorPacket};

/// Sensor data callback type
///
/// Invoked by the simulator on its own delivery thread for every payload.
pub type SensorDataCallback = Arc<dyn Fn(SensorPacket) + Send + Sync>;

/// Sensor data source trait
///
/// Abstracts the common behavior of real simulator sensors, the world-tick
/// pseudo-sensor and mock sensors, so that ingestion treats them uniformly.
///
/// # Example
///
/// ```ignore
/// let sensor: Box<dyn SensorSource> = client.sensor_source(actor_id, "rgb", SensorKind::Camera)?;
/// sensor.listen(Arc::new(|packet| {
///     println!("frame {}", packet.frame);
/// }));
/// // ... use sensor ...
/// sensor.stop();
/// ```
pub trait SensorSource: Send + Sync {
    /// Get sensor ID
    fn sensor_id(&self) -> &str;

    /// Get sensor kind
    fn sensor_kind(&self) -> SensorKind;

    /// Register data callback
    ///
    /// Repeated calls while already listening are ignored.
    fn listen(&self, callback: SensorDataCallback);

    /// Stop listening
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
