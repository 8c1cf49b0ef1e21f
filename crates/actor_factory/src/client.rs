//! Simulator client abstraction
//!
//! Defines the operations the collector needs from CARLA, implemented by the
//! real client (feature `real-carla`) and by `MockSimulator`.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use contracts::{ActorId, SensorKind, SensorSource, SimulationStep, Transform, VehicleSnapshot};

use crate::error::Result;

/// World stepping settings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldSettings {
    pub synchronous_mode: bool,

    /// `None` = variable time step
    pub fixed_delta_seconds: Option<f64>,
}

/// Vehicle light state bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightState(pub u32);

impl LightState {
    pub const NONE: Self = Self(0);
    pub const POSITION: Self = Self(0x1);
    pub const LOW_BEAM: Self = Self(0x2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for LightState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Map-baked object categories that can be switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentLabel {
    Car,
    Bus,
    Truck,
    Motorcycle,
    Bicycle,
    Rider,
}

impl EnvironmentLabel {
    /// Categories covering parked road users
    pub const PARKED_VEHICLES: [Self; 6] = [
        Self::Car,
        Self::Bus,
        Self::Truck,
        Self::Motorcycle,
        Self::Bicycle,
        Self::Rider,
    ];
}

/// Catalog entry for one vehicle archetype
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintInfo {
    /// Archetype id, e.g. "vehicle.audi.tt"
    pub id: String,

    /// Attribute name -> value
    pub attributes: HashMap<String, String>,

    /// Attribute name -> recommended values (e.g. `color`, `driver_id`)
    pub recommended_values: HashMap<String, Vec<String>>,
}

impl BlueprintInfo {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// One vehicle spawn command
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub blueprint: String,
    pub transform: Transform,

    /// Attributes set on the blueprint before spawn
    pub attributes: HashMap<String, String>,

    /// Enable autopilot as part of the same command
    pub autopilot: bool,
}

/// Per-entry result of a batched command
pub type BatchResponse<T> = std::result::Result<T, String>;

/// Simulator client trait
///
/// Abstracts CARLA core operations for testing and future implementation
/// replacement. All methods except `connect` take `&self`; implementations use
/// interior mutability.
pub trait SimulatorClient: Send + Sync {
    /// Connect to the simulator server
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Asset paths of the maps the server can load
    fn available_maps(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Load a map by asset path
    fn load_world(&self, map: &str) -> impl Future<Output = Result<()>> + Send;

    fn settings(&self) -> impl Future<Output = Result<WorldSettings>> + Send;

    fn apply_settings(&self, settings: WorldSettings) -> impl Future<Output = Result<()>> + Send;

    /// Traffic manager on `port`: synchronous mode and global leading distance
    fn configure_traffic_manager(
        &self,
        port: u16,
        synchronous: bool,
        leading_distance: f64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_sun_altitude(&self, degrees: f64) -> impl Future<Output = Result<()>> + Send;

    /// Disable map-baked objects with any of `labels`, returning how many were toggled
    fn disable_environment_objects(
        &self,
        labels: &[EnvironmentLabel],
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Advance the world by one step (synchronous mode)
    fn tick(&self) -> impl Future<Output = Result<SimulationStep>> + Send;

    fn spawn_points(&self) -> impl Future<Output = Result<Vec<Transform>>> + Send;

    /// Vehicle catalog entries matching a wildcard filter
    fn vehicle_blueprints(
        &self,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<BlueprintInfo>>> + Send;

    /// Spawn one vehicle
    fn spawn_vehicle(&self, request: &SpawnRequest) -> impl Future<Output = Result<ActorId>> + Send;

    /// Spawn vehicles in one synchronous batch
    ///
    /// Entries fail independently; the outer error is reserved for transport failures.
    fn spawn_batch(
        &self,
        requests: Vec<SpawnRequest>,
        tm_port: u16,
    ) -> impl Future<Output = Result<Vec<BatchResponse<ActorId>>>> + Send;

    /// Spawn a sensor attached to `parent_id`
    fn spawn_sensor(
        &self,
        blueprint: &str,
        transform: Transform,
        parent_id: ActorId,
        attributes: &HashMap<String, String>,
    ) -> impl Future<Output = Result<ActorId>> + Send;

    fn set_autopilot(
        &self,
        actor_id: ActorId,
        enabled: bool,
        tm_port: u16,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_light_state(
        &self,
        actor_id: ActorId,
        state: LightState,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Move the spectator camera
    fn set_spectator_transform(
        &self,
        transform: Transform,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Destroy one actor
    ///
    /// Idempotent: returns Ok if the actor doesn't exist
    fn destroy_actor(&self, actor_id: ActorId) -> impl Future<Output = Result<()>> + Send;

    /// Destroy actors in one batch; entries fail independently
    fn destroy_batch(
        &self,
        actor_ids: &[ActorId],
    ) -> impl Future<Output = Result<Vec<BatchResponse<()>>>> + Send;

    /// Live vehicles with archetype and bounding box
    fn vehicles(&self) -> impl Future<Output = Result<Vec<VehicleSnapshot>>> + Send;

    /// World-tick listener, delivering one `WorldSnapshot` per tick
    fn tick_source(&self) -> Box<dyn SensorSource>;

    /// Get sensor data source
    ///
    /// Returns `None` if the actor doesn't exist or is not a sensor.
    fn sensor_source(
        &self,
        actor_id: ActorId,
        sensor_id: String,
        sensor_kind: SensorKind,
    ) -> Option<Box<dyn SensorSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_state_mask() {
        let state = LightState::POSITION | LightState::LOW_BEAM;
        assert_eq!(state.0, 0x3);
        assert!(state.contains(LightState::LOW_BEAM));
        assert!(!LightState::POSITION.contains(LightState::LOW_BEAM));
    }
}
