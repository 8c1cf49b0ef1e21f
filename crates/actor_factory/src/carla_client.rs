//! Real CARLA client implementation
//!
//! Connects to a CARLA server through the carla-rust crate. Batched commands
//! are issued entry by entry so that failures stay per-entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use carla::client::{ActorBase, Client, Sensor, TrafficManager, Vehicle, World};
use carla::geom::{Location, Rotation, Transform as CarlaTransform};
use carla::rpc::{CityObjectLabel, VehicleLightState};
use contracts::{
    ActorId, ActorSnapshot, BoundingBox3D, SensorKind, SensorPacket, SensorPayload, SensorSource,
    SimulationStep, Transform, Vector3, VehicleSnapshot, WorldSnapshot,
};
use tracing::{debug, info, instrument, warn};

use crate::carla_sensor_source::{CarlaSensorSource, CarlaTickSource};
use crate::client::{
    BatchResponse, BlueprintInfo, EnvironmentLabel, LightState, SimulatorClient, SpawnRequest,
    WorldSettings,
};
use crate::error::{ActorFactoryError, Result};
use crate::mock_client::WORLD_TICK_ID;
use crate::mock_sensor::ListenerSlot;

const SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
enum ActorHandle {
    Vehicle(Vehicle),
    Sensor { sensor: Sensor, fov: f64 },
}

/// Real CARLA client
///
/// Interior mutability lets `&self` methods drive the world.
#[derive(Default, Clone)]
pub struct RealCarlaClient {
    client: Arc<Mutex<Option<Client>>>,
    world: Arc<Mutex<Option<World>>>,
    traffic_manager: Arc<Mutex<Option<TrafficManager>>>,
    actors: Arc<Mutex<HashMap<ActorId, ActorHandle>>>,
    tick_listeners: Arc<Mutex<Vec<Arc<ListenerSlot>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RealCarlaClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_connected() -> ActorFactoryError {
        ActorFactoryError::ConnectionFailed {
            message: "not connected to CARLA server".into(),
        }
    }

    fn with_client<R>(&self, f: impl FnOnce(&mut Client) -> Result<R>) -> Result<R> {
        let mut guard = lock(&self.client);
        let client = guard.as_mut().ok_or_else(Self::not_connected)?;
        f(client)
    }

    fn with_world<R>(&self, f: impl FnOnce(&mut World) -> Result<R>) -> Result<R> {
        let mut guard = lock(&self.world);
        let world = guard.as_mut().ok_or_else(Self::not_connected)?;
        f(world)
    }

    fn vehicle(&self, actor_id: ActorId) -> Result<Vehicle> {
        match lock(&self.actors).get(&actor_id) {
            Some(ActorHandle::Vehicle(vehicle)) => Ok(vehicle.clone()),
            _ => Err(ActorFactoryError::Contract(
                contracts::ContractError::ActorNotFound { actor_id },
            )),
        }
    }

    fn to_carla_transform(transform: &Transform) -> CarlaTransform {
        CarlaTransform {
            location: Location {
                x: transform.location.x as f32,
                y: transform.location.y as f32,
                z: transform.location.z as f32,
            },
            rotation: Rotation {
                pitch: transform.rotation.pitch as f32,
                yaw: transform.rotation.yaw as f32,
                roll: transform.rotation.roll as f32,
            },
        }
    }

    fn from_carla_transform(transform: &CarlaTransform) -> Transform {
        Transform {
            location: contracts::Location {
                x: transform.location.x as f64,
                y: transform.location.y as f64,
                z: transform.location.z as f64,
            },
            rotation: contracts::Rotation {
                pitch: transform.rotation.pitch as f64,
                yaw: transform.rotation.yaw as f64,
                roll: transform.rotation.roll as f64,
            },
        }
    }

    fn city_object_label(label: EnvironmentLabel) -> CityObjectLabel {
        match label {
            EnvironmentLabel::Car => CityObjectLabel::Car,
            EnvironmentLabel::Bus => CityObjectLabel::Bus,
            EnvironmentLabel::Truck => CityObjectLabel::Truck,
            EnvironmentLabel::Motorcycle => CityObjectLabel::Motorcycle,
            EnvironmentLabel::Bicycle => CityObjectLabel::Bicycle,
            EnvironmentLabel::Rider => CityObjectLabel::Rider,
        }
    }

    /// Spawn a vehicle; autopilot binds to `tm_port` when given
    fn spawn_one(&self, request: &SpawnRequest, tm_port: Option<u16>) -> Result<ActorId> {
        let vehicle = self.with_world(|world| {
            let mut blueprint = world
                .blueprint_library()
                .find(&request.blueprint)
                .ok_or_else(|| {
                    ActorFactoryError::vehicle_spawn(&request.blueprint, "blueprint not found")
                })?;
            for (key, value) in &request.attributes {
                if !blueprint.set_attribute(key, value) {
                    warn!(key, value, "failed to set vehicle attribute");
                }
            }
            let actor = world
                .spawn_actor(&blueprint, &Self::to_carla_transform(&request.transform))
                .map_err(|e| ActorFactoryError::vehicle_spawn(&request.blueprint, e.to_string()))?;
            Vehicle::try_from(actor).map_err(|_| {
                ActorFactoryError::vehicle_spawn(&request.blueprint, "spawned actor is not a vehicle")
            })
        })?;

        let actor_id = vehicle.id();
        if request.autopilot {
            match tm_port {
                Some(port) => vehicle.set_autopilot_opt(true, port),
                None => vehicle.set_autopilot(true),
            }
        }
        debug!(actor_id, blueprint = %request.blueprint, "vehicle spawned");
        lock(&self.actors).insert(actor_id, ActorHandle::Vehicle(vehicle));
        Ok(actor_id)
    }

    fn destroy_one(&self, actor_id: ActorId) -> Result<()> {
        let Some(handle) = lock(&self.actors).remove(&actor_id) else {
            return Ok(());
        };
        let destroyed = match handle {
            ActorHandle::Vehicle(vehicle) => vehicle.destroy(),
            ActorHandle::Sensor { sensor, .. } => {
                if sensor.is_listening() {
                    sensor.stop();
                }
                sensor.destroy()
            }
        };
        if destroyed {
            debug!(actor_id, "actor destroyed");
            Ok(())
        } else {
            Err(ActorFactoryError::DestroyFailed {
                actor_id,
                message: "server refused destroy".into(),
            })
        }
    }

    fn world_snapshot(world: &World) -> WorldSnapshot {
        let snapshot = world.snapshot();
        let timestamp = snapshot.timestamp();
        WorldSnapshot {
            frame: snapshot.frame() as u64,
            elapsed_seconds: timestamp.elapsed_seconds,
            delta_seconds: timestamp.delta_seconds,
            actors: snapshot
                .actor_snapshots()
                .map(|actor| {
                    let velocity = actor.velocity();
                    ActorSnapshot {
                        id: actor.id(),
                        transform: Self::from_carla_transform(&actor.transform()),
                        velocity: Vector3::new(
                            velocity.x as f64,
                            velocity.y as f64,
                            velocity.z as f64,
                        ),
                    }
                })
                .collect(),
        }
    }
}

impl SimulatorClient for RealCarlaClient {
    #[instrument(name = "real_carla_connect", skip(self), fields(host = %host, port))]
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let mut client = Client::connect(host, port, None);
        client.set_timeout(timeout);
        let world = client.world();
        info!(map = %world.map().name(), "connected to CARLA server");

        *lock(&self.client) = Some(client);
        *lock(&self.world) = Some(world);
        Ok(())
    }

    async fn available_maps(&self) -> Result<Vec<String>> {
        self.with_client(|client| Ok(client.available_maps()))
    }

    #[instrument(name = "real_carla_load_world", skip(self))]
    async fn load_world(&self, map: &str) -> Result<()> {
        let world = self.with_client(|client| Ok(client.load_world(map)))?;
        *lock(&self.world) = Some(world);
        Ok(())
    }

    async fn settings(&self) -> Result<WorldSettings> {
        self.with_world(|world| {
            let settings = world.settings();
            Ok(WorldSettings {
                synchronous_mode: settings.synchronous_mode,
                fixed_delta_seconds: settings.fixed_delta_seconds,
            })
        })
    }

    async fn apply_settings(&self, settings: WorldSettings) -> Result<()> {
        self.with_world(|world| {
            let mut current = world.settings();
            current.synchronous_mode = settings.synchronous_mode;
            current.fixed_delta_seconds = settings.fixed_delta_seconds;
            world.apply_settings(&current, SETTINGS_TIMEOUT);
            Ok(())
        })
    }

    async fn configure_traffic_manager(
        &self,
        port: u16,
        synchronous: bool,
        leading_distance: f64,
    ) -> Result<()> {
        let mut tm = self.with_client(|client| Ok(client.instance_tm(Some(port))))?;
        tm.set_synchronous_mode(synchronous);
        tm.set_global_distance_to_leading_vehicle(leading_distance as f32);
        *lock(&self.traffic_manager) = Some(tm);
        Ok(())
    }

    async fn set_sun_altitude(&self, degrees: f64) -> Result<()> {
        self.with_world(|world| {
            let mut weather = world.weather();
            weather.sun_altitude_angle = degrees as f32;
            world.set_weather(&weather);
            Ok(())
        })
    }

    async fn disable_environment_objects(&self, labels: &[EnvironmentLabel]) -> Result<usize> {
        self.with_world(|world| {
            let mut ids: Vec<u64> = Vec::new();
            for label in labels {
                ids.extend(
                    world
                        .environment_objects(Self::city_object_label(*label))
                        .iter()
                        .map(|object| object.id()),
                );
            }
            world.enable_environment_objects(&ids, false);
            Ok(ids.len())
        })
    }

    async fn tick(&self) -> Result<SimulationStep> {
        let (step, snapshot) = self.with_world(|world| {
            let frame = world.tick() as u64;
            let snapshot = Self::world_snapshot(world);
            Ok((
                SimulationStep {
                    frame,
                    delta_seconds: snapshot.delta_seconds,
                },
                snapshot,
            ))
        })?;

        let listeners = lock(&self.tick_listeners).clone();
        for slot in listeners {
            slot.deliver(SensorPacket {
                sensor_id: WORLD_TICK_ID.to_string(),
                sensor_kind: SensorKind::WorldTick,
                frame: snapshot.frame,
                timestamp: snapshot.elapsed_seconds,
                payload: SensorPayload::WorldSnapshot(snapshot.clone()),
            });
        }
        Ok(step)
    }

    async fn spawn_points(&self) -> Result<Vec<Transform>> {
        self.with_world(|world| {
            Ok(world
                .map()
                .recommended_spawn_points()
                .iter()
                .map(Self::from_carla_transform)
                .collect())
        })
    }

    async fn vehicle_blueprints(&self, filter: &str) -> Result<Vec<BlueprintInfo>> {
        self.with_world(|world| {
            Ok(world
                .blueprint_library()
                .filter(filter)
                .iter()
                .map(|bp| {
                    let mut attributes = HashMap::new();
                    let mut recommended_values = HashMap::new();
                    for attribute in bp.iter() {
                        attributes.insert(attribute.id().to_string(), attribute.value_string());
                        let values = attribute.recommended_values();
                        if !values.is_empty() {
                            recommended_values.insert(attribute.id().to_string(), values);
                        }
                    }
                    BlueprintInfo {
                        id: bp.id().to_string(),
                        attributes,
                        recommended_values,
                    }
                })
                .collect())
        })
    }

    #[instrument(name = "real_carla_spawn_vehicle", skip(self, request), fields(blueprint = %request.blueprint))]
    async fn spawn_vehicle(&self, request: &SpawnRequest) -> Result<ActorId> {
        self.spawn_one(request, None)
    }

    #[instrument(name = "real_carla_spawn_batch", skip(self, requests), fields(count = requests.len()))]
    async fn spawn_batch(
        &self,
        requests: Vec<SpawnRequest>,
        tm_port: u16,
    ) -> Result<Vec<BatchResponse<ActorId>>> {
        Ok(requests
            .iter()
            .map(|request| {
                self.spawn_one(request, Some(tm_port))
                    .map_err(|e| e.to_string())
            })
            .collect())
    }

    #[instrument(
        name = "real_carla_spawn_sensor",
        skip(self, transform, attributes),
        fields(blueprint = %blueprint, parent_id)
    )]
    async fn spawn_sensor(
        &self,
        blueprint: &str,
        transform: Transform,
        parent_id: ActorId,
        attributes: &HashMap<String, String>,
    ) -> Result<ActorId> {
        let parent = self
            .vehicle(parent_id)
            .map_err(|_| ActorFactoryError::sensor_spawn(blueprint, parent_id, "parent vehicle not found"))?;

        let sensor = self.with_world(|world| {
            let mut sensor_bp = world.blueprint_library().find(blueprint).ok_or_else(|| {
                ActorFactoryError::sensor_spawn(blueprint, parent_id, "blueprint not found")
            })?;
            for (key, value) in attributes {
                if !sensor_bp.set_attribute(key, value) {
                    warn!(key, value, "failed to set sensor attribute");
                }
            }
            let actor = world
                .spawn_actor_attached(&sensor_bp, &Self::to_carla_transform(&transform), &parent, None)
                .map_err(|e| ActorFactoryError::sensor_spawn(blueprint, parent_id, e.to_string()))?;
            Sensor::try_from(actor).map_err(|_| {
                ActorFactoryError::sensor_spawn(blueprint, parent_id, "spawned actor is not a sensor")
            })
        })?;

        let actor_id = sensor.id();
        let fov = attributes
            .get("fov")
            .and_then(|value| value.parse().ok())
            .unwrap_or(90.0);
        debug!(actor_id, blueprint, parent_id, "sensor spawned and attached");
        lock(&self.actors).insert(actor_id, ActorHandle::Sensor { sensor, fov });
        Ok(actor_id)
    }

    async fn set_autopilot(&self, actor_id: ActorId, enabled: bool, tm_port: u16) -> Result<()> {
        let vehicle = self.vehicle(actor_id)?;
        vehicle.set_autopilot_opt(enabled, tm_port);
        Ok(())
    }

    async fn set_light_state(&self, actor_id: ActorId, state: LightState) -> Result<()> {
        let vehicle = self.vehicle(actor_id)?;
        vehicle.set_light_state(VehicleLightState::from_bits_truncate(state.0));
        Ok(())
    }

    async fn set_spectator_transform(&self, transform: Transform) -> Result<()> {
        self.with_world(|world| {
            world
                .spectator()
                .set_transform(&Self::to_carla_transform(&transform));
            Ok(())
        })
    }

    #[instrument(name = "real_carla_destroy_actor", skip(self), fields(actor_id))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        self.destroy_one(actor_id)
    }

    #[instrument(name = "real_carla_destroy_batch", skip(self, actor_ids), fields(count = actor_ids.len()))]
    async fn destroy_batch(&self, actor_ids: &[ActorId]) -> Result<Vec<BatchResponse<()>>> {
        Ok(actor_ids
            .iter()
            .map(|id| self.destroy_one(*id).map_err(|e| e.to_string()))
            .collect())
    }

    async fn vehicles(&self) -> Result<Vec<VehicleSnapshot>> {
        self.with_world(|world| {
            Ok(world
                .actors()
                .filter("vehicle.*")
                .iter()
                .filter_map(|actor| Vehicle::try_from(actor).ok())
                .map(|vehicle| {
                    let bbox = vehicle.bounding_box();
                    let velocity = vehicle.velocity();
                    VehicleSnapshot {
                        id: vehicle.id(),
                        type_id: vehicle.type_id(),
                        transform: Self::from_carla_transform(&vehicle.transform()),
                        velocity: Vector3::new(
                            velocity.x as f64,
                            velocity.y as f64,
                            velocity.z as f64,
                        ),
                        bounding_box: BoundingBox3D {
                            location: contracts::Location {
                                x: bbox.transform.location.x as f64,
                                y: bbox.transform.location.y as f64,
                                z: bbox.transform.location.z as f64,
                            },
                            extent: Vector3::new(
                                bbox.extent.x as f64,
                                bbox.extent.y as f64,
                                bbox.extent.z as f64,
                            ),
                        },
                    }
                })
                .collect())
        })
    }

    fn tick_source(&self) -> Box<dyn SensorSource> {
        let slot = ListenerSlot::new();
        lock(&self.tick_listeners).push(slot.clone());
        Box::new(CarlaTickSource::new(slot))
    }

    fn sensor_source(
        &self,
        actor_id: ActorId,
        sensor_id: String,
        sensor_kind: SensorKind,
    ) -> Option<Box<dyn SensorSource>> {
        match lock(&self.actors).get(&actor_id)? {
            ActorHandle::Sensor { sensor, fov } => Some(Box::new(CarlaSensorSource::new(
                sensor_id,
                sensor_kind,
                *fov,
                sensor.clone(),
            ))),
            ActorHandle::Vehicle(_) => None,
        }
    }
}
