//! Mock simulator
//!
//! In-process world model for tests and offline runs. Every `tick()` advances
//! the frame counter, moves autopilot vehicles, and fires the world-tick
//! listeners and due sensors, the way CARLA does in synchronous mode.
//! Faults can be injected per frame, per batch entry and per actor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    ActorId, ActorSnapshot, BoundingBox3D, FrameId, Location, Rotation, SensorKind, SensorPacket,
    SensorPayload, SensorSource, SimulationStep, Transform, Vector3, VehicleSnapshot,
    WorldSnapshot,
};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

use crate::client::{
    BatchResponse, BlueprintInfo, EnvironmentLabel, LightState, SimulatorClient, SpawnRequest, WorldSettings,
};
use crate::error::{ActorFactoryError, Result};
use crate::mock_sensor::{self, LidarTarget, ListenerSlot, MockSensor};

/// Sensor id used for world-tick packets
pub const WORLD_TICK_ID: &str = "world_tick";

const SENSOR_TICK_TOLERANCE: f64 = 1e-9;

/// Static description of the mock world
#[derive(Debug, Clone)]
pub struct MockWorldConfig {
    /// Map asset paths the server reports
    pub maps: Vec<String>,

    /// Number of spawn points (laid out on a grid along +x)
    pub spawn_points: usize,

    /// Vehicle catalog
    pub catalog: Vec<BlueprintInfo>,

    /// Parked vehicles baked into the map
    pub parked_vehicles: usize,

    /// Settings before any client changes them
    pub initial_settings: WorldSettings,

    /// Semantic LiDAR hits generated on every vehicle in range
    pub lidar_hits_per_vehicle: u32,

    /// Autopilot speed (m/s)
    pub autopilot_speed: f64,
}

impl Default for MockWorldConfig {
    fn default() -> Self {
        Self {
            maps: ["Town01", "Town03", "Town06", "Town10HD_Opt"]
                .iter()
                .map(|name| format!("/Game/Carla/Maps/{name}"))
                .collect(),
            spawn_points: 24,
            catalog: default_catalog(),
            parked_vehicles: 12,
            initial_settings: WorldSettings::default(),
            lidar_hits_per_vehicle: 40,
            autopilot_speed: 8.0,
        }
    }
}

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    /// (target, frame) payloads that are never delivered; the target is a
    /// sensor kind name (`camera`, `semantic_lidar`, `world_tick`) or `actor_<id>`
    pub dropped_payloads: Vec<(String, FrameId)>,

    /// Batch spawn entries (by index) that fail
    pub failing_batch_entries: Vec<usize>,

    /// Archetypes whose spawn always fails
    pub failing_blueprints: Vec<String>,

    /// Actors whose destroy request fails
    pub failing_destroys: Vec<ActorId>,

    /// Frame whose tick returns an error
    pub failing_tick: Option<FrameId>,
}

#[derive(Debug, Clone)]
struct VehicleState {
    autopilot: bool,
    /// Traffic manager the autopilot is bound to
    tm_port: Option<u16>,
    lights: LightState,
    attributes: HashMap<String, String>,
}

#[derive(Clone)]
struct SensorState {
    kind: SensorKind,
    parent: ActorId,
    mount: Transform,
    attributes: HashMap<String, String>,
    since_last: f64,
    slot: Arc<ListenerSlot>,
}

impl SensorState {
    fn attribute(&self, key: &str, default: f64) -> f64 {
        self.attributes
            .get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }
}

#[derive(Clone)]
enum ActorRole {
    Vehicle(VehicleState),
    Sensor(SensorState),
}

#[derive(Clone)]
struct MockActor {
    type_id: String,
    transform: Transform,
    velocity: Vector3,
    bounding_box: BoundingBox3D,
    role: ActorRole,
}

struct MockState {
    connected: bool,
    current_map: Option<String>,
    settings: WorldSettings,
    traffic_manager: Option<(u16, bool, f64)>,
    sun_altitude: Option<f64>,
    parked_enabled: usize,
    disabled_labels: Vec<EnvironmentLabel>,
    spectator: Vec<Transform>,
    frame: FrameId,
    elapsed: f64,
    next_actor_id: ActorId,
    actors: BTreeMap<ActorId, MockActor>,
    tick_listeners: Vec<Arc<ListenerSlot>>,
    destroy_requests: Vec<ActorId>,
    applied_settings: Vec<WorldSettings>,
}

/// Mock CARLA simulator
///
/// Cloning yields another handle to the same world.
#[derive(Clone)]
pub struct MockSimulator {
    world: Arc<MockWorldConfig>,
    faults: Arc<MockFaults>,
    state: Arc<Mutex<MockState>>,
    frames: Arc<watch::Sender<FrameId>>,
}

impl MockSimulator {
    /// Create default mock world
    pub fn new() -> Self {
        Self::with_config(MockWorldConfig::default(), MockFaults::default())
    }

    /// Create mock world with configuration and injected faults
    pub fn with_config(world: MockWorldConfig, faults: MockFaults) -> Self {
        let (frames, _) = watch::channel(0);
        let parked = world.parked_vehicles;
        let settings = world.initial_settings;
        Self {
            world: Arc::new(world),
            faults: Arc::new(faults),
            state: Arc::new(Mutex::new(MockState {
                connected: false,
                current_map: None,
                settings,
                traffic_manager: None,
                sun_altitude: None,
                parked_enabled: parked,
                disabled_labels: Vec::new(),
                spectator: Vec::new(),
                frame: 0,
                elapsed: 0.0,
                next_actor_id: 1000,
                actors: BTreeMap::new(),
                tick_listeners: Vec::new(),
                destroy_requests: Vec::new(),
                applied_settings: Vec::new(),
            })),
            frames: Arc::new(frames),
        }
    }

    /// Watch the frame counter (updated after every tick)
    pub fn subscribe_frames(&self) -> watch::Receiver<FrameId> {
        self.frames.subscribe()
    }

    /// Current frame id
    pub fn frame(&self) -> FrameId {
        self.lock().frame
    }

    /// Number of live actors
    pub fn actor_count(&self) -> usize {
        self.lock().actors.len()
    }

    /// Ids of every live actor
    pub fn alive_actor_ids(&self) -> Vec<ActorId> {
        self.lock().actors.keys().copied().collect()
    }

    /// Every destroy request received, in order, including failed ones
    pub fn destroy_requests(&self) -> Vec<ActorId> {
        self.lock().destroy_requests.clone()
    }

    /// Every settings change applied, in order
    pub fn applied_settings(&self) -> Vec<WorldSettings> {
        self.lock().applied_settings.clone()
    }

    pub fn current_map(&self) -> Option<String> {
        self.lock().current_map.clone()
    }

    /// (port, synchronous, leading distance) of the configured traffic manager
    pub fn traffic_manager(&self) -> Option<(u16, bool, f64)> {
        self.lock().traffic_manager
    }

    pub fn sun_altitude(&self) -> Option<f64> {
        self.lock().sun_altitude
    }

    /// Parked vehicles still enabled in the map
    pub fn parked_vehicles_enabled(&self) -> usize {
        self.lock().parked_enabled
    }

    /// Environment labels passed to every disable request, in order
    pub fn disabled_environment_labels(&self) -> Vec<EnvironmentLabel> {
        self.lock().disabled_labels.clone()
    }

    /// Every spectator transform set, in order
    pub fn spectator_moves(&self) -> Vec<Transform> {
        self.lock().spectator.clone()
    }

    /// Traffic manager port a vehicle's autopilot is bound to
    pub fn autopilot_port(&self, actor_id: ActorId) -> Option<u16> {
        match &self.lock().actors.get(&actor_id)?.role {
            ActorRole::Vehicle(vehicle) => vehicle.tm_port,
            ActorRole::Sensor(_) => None,
        }
    }

    pub fn light_state(&self, actor_id: ActorId) -> Option<LightState> {
        match &self.lock().actors.get(&actor_id)?.role {
            ActorRole::Vehicle(vehicle) => Some(vehicle.lights),
            ActorRole::Sensor(_) => None,
        }
    }

    pub fn autopilot(&self, actor_id: ActorId) -> Option<bool> {
        match &self.lock().actors.get(&actor_id)?.role {
            ActorRole::Vehicle(vehicle) => Some(vehicle.autopilot),
            ActorRole::Sensor(_) => None,
        }
    }

    /// Attributes a vehicle was spawned with
    pub fn vehicle_attributes(&self, actor_id: ActorId) -> Option<HashMap<String, String>> {
        match &self.lock().actors.get(&actor_id)?.role {
            ActorRole::Vehicle(vehicle) => Some(vehicle.attributes.clone()),
            ActorRole::Sensor(_) => None,
        }
    }

    /// Whether a sensor actor currently has a listener attached
    pub fn sensor_listening(&self, actor_id: ActorId) -> bool {
        match self.lock().actors.get(&actor_id).map(|actor| &actor.role) {
            Some(ActorRole::Sensor(sensor)) => sensor.slot.is_listening(),
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(state: &MockState) -> Result<()> {
        if state.connected {
            Ok(())
        } else {
            Err(ActorFactoryError::ConnectionFailed {
                message: "not connected".into(),
            })
        }
    }

    fn spawn_point(index: usize) -> Transform {
        Transform::from_location(
            10.0 + 12.0 * (index / 4) as f64,
            -7.5 + 5.0 * (index % 4) as f64,
            0.5,
        )
    }

    fn spawn_vehicle_locked(
        &self,
        state: &mut MockState,
        request: &SpawnRequest,
        tm_port: Option<u16>,
    ) -> Result<ActorId> {
        Self::ensure_connected(state)?;
        let blueprint = self
            .world
            .catalog
            .iter()
            .find(|bp| bp.id == request.blueprint)
            .ok_or_else(|| {
                ActorFactoryError::vehicle_spawn(&request.blueprint, "blueprint not found")
            })?;
        if self.faults.failing_blueprints.contains(&request.blueprint) {
            return Err(ActorFactoryError::vehicle_spawn(
                &request.blueprint,
                "injected spawn failure",
            ));
        }

        let target = request.transform.location;
        let occupied = state.actors.values().any(|actor| {
            matches!(actor.role, ActorRole::Vehicle(_))
                && actor.transform.location.distance(&target) < 1.0
        });
        if occupied {
            return Err(ActorFactoryError::vehicle_spawn(
                &request.blueprint,
                "Spawn failed because of collision at spawn position",
            ));
        }

        let extent = extent_for(blueprint.attribute("base_type").unwrap_or_default());
        let actor_id = state.next_actor_id;
        state.next_actor_id += 1;
        state.actors.insert(
            actor_id,
            MockActor {
                type_id: blueprint.id.clone(),
                transform: request.transform,
                velocity: Vector3::default(),
                bounding_box: BoundingBox3D {
                    location: Location {
                        x: 0.0,
                        y: 0.0,
                        z: extent.z,
                    },
                    extent,
                },
                role: ActorRole::Vehicle(VehicleState {
                    autopilot: request.autopilot,
                    tm_port: tm_port.filter(|_| request.autopilot),
                    lights: LightState::NONE,
                    attributes: request.attributes.clone(),
                }),
            },
        );
        Ok(actor_id)
    }

    fn destroy_locked(&self, state: &mut MockState, actor_id: ActorId) -> Result<()> {
        state.destroy_requests.push(actor_id);
        if self.faults.failing_destroys.contains(&actor_id) {
            return Err(ActorFactoryError::DestroyFailed {
                actor_id,
                message: "injected destroy failure".into(),
            });
        }
        // Idempotent: missing actors are fine
        if let Some(MockActor {
            role: ActorRole::Sensor(sensor),
            ..
        }) = state.actors.remove(&actor_id)
        {
            if sensor.slot.is_listening() {
                debug!(actor_id, "destroying sensor that is still listening");
            }
        }
        Ok(())
    }

    fn is_dropped(&self, sensor_id: &str, kind: SensorKind, frame: FrameId) -> bool {
        self.faults
            .dropped_payloads
            .iter()
            .any(|(id, dropped_frame)| {
                *dropped_frame == frame && (id == sensor_id || sensor_kind_matches(id, kind))
            })
    }

    /// Advance actors and collect the deliveries of one step
    fn step_locked(
        &self,
        state: &mut MockState,
        delta: f64,
    ) -> (SimulationStep, Vec<(Arc<ListenerSlot>, SensorPacket)>) {
        state.frame += 1;
        state.elapsed += delta;
        let frame = state.frame;
        let elapsed = state.elapsed;

        let speed = self.world.autopilot_speed;
        for actor in state.actors.values_mut() {
            if let ActorRole::Vehicle(VehicleState { autopilot: true, .. }) = actor.role {
                let yaw = actor.transform.rotation.yaw.to_radians();
                actor.velocity = Vector3::new(speed * yaw.cos(), speed * yaw.sin(), 0.0);
                actor.transform.location.x += actor.velocity.x * delta;
                actor.transform.location.y += actor.velocity.y * delta;
            }
        }

        // sensors follow their parent
        let poses: HashMap<ActorId, Transform> = state
            .actors
            .iter()
            .map(|(id, actor)| (*id, actor.transform))
            .collect();
        for actor in state.actors.values_mut() {
            if let ActorRole::Sensor(sensor) = &actor.role {
                if let Some(parent) = poses.get(&sensor.parent) {
                    actor.transform = compose(parent, &sensor.mount);
                }
            }
        }

        let snapshot = WorldSnapshot {
            frame,
            elapsed_seconds: elapsed,
            delta_seconds: delta,
            actors: state
                .actors
                .iter()
                .map(|(id, actor)| ActorSnapshot {
                    id: *id,
                    transform: actor.transform,
                    velocity: actor.velocity,
                })
                .collect(),
        };

        let tick_dropped = self.is_dropped(WORLD_TICK_ID, SensorKind::WorldTick, frame);
        let mut deliveries: Vec<(Arc<ListenerSlot>, SensorPacket)> = state
            .tick_listeners
            .iter()
            .filter(|slot| slot.is_listening() && !tick_dropped)
            .map(|slot| {
                (
                    slot.clone(),
                    SensorPacket {
                        sensor_id: WORLD_TICK_ID.to_string(),
                        sensor_kind: SensorKind::WorldTick,
                        frame,
                        timestamp: elapsed,
                        payload: SensorPayload::WorldSnapshot(snapshot.clone()),
                    },
                )
            })
            .collect();

        let targets: Vec<(ActorId, LidarTarget)> = state
            .actors
            .iter()
            .filter(|(_, actor)| matches!(actor.role, ActorRole::Vehicle(_)))
            .map(|(id, actor)| {
                let center = Location {
                    x: actor.transform.location.x + actor.bounding_box.location.x,
                    y: actor.transform.location.y + actor.bounding_box.location.y,
                    z: actor.transform.location.z + actor.bounding_box.location.z,
                };
                let extent = actor.bounding_box.extent;
                (
                    *id,
                    LidarTarget {
                        actor_id: *id,
                        center,
                        extent: Location {
                            x: extent.x,
                            y: extent.y,
                            z: extent.z,
                        },
                    },
                )
            })
            .collect();

        let hits = self.world.lidar_hits_per_vehicle;
        for (actor_id, actor) in state.actors.iter_mut() {
            let ActorRole::Sensor(sensor) = &mut actor.role else {
                continue;
            };
            sensor.since_last += delta;
            let tick = sensor.attribute("sensor_tick", 0.0);
            if sensor.since_last + SENSOR_TICK_TOLERANCE < tick {
                continue;
            }
            sensor.since_last = 0.0;
            if !sensor.slot.is_listening() {
                continue;
            }

            let sensor_id = format!("actor_{actor_id}");
            if self.is_dropped(&sensor_id, sensor.kind, frame) {
                trace!(actor_id, frame, "dropping injected payload");
                continue;
            }

            let payload = match sensor.kind {
                SensorKind::Camera => SensorPayload::Image(mock_sensor::mock_image(
                    sensor.attribute("image_size_x", 800.0) as u32,
                    sensor.attribute("image_size_y", 600.0) as u32,
                    sensor.attribute("fov", 90.0),
                    frame,
                )),
                SensorKind::SemanticLidar => {
                    let visible: Vec<LidarTarget> = targets
                        .iter()
                        .filter(|(id, _)| *id != sensor.parent)
                        .map(|(_, target)| *target)
                        .collect();
                    SensorPayload::SemanticPointCloud(mock_sensor::mock_point_cloud(
                        actor.transform.location,
                        &visible,
                        hits,
                        sensor.attribute("range", 100.0),
                    ))
                }
                SensorKind::WorldTick => continue,
            };
            deliveries.push((
                sensor.slot.clone(),
                SensorPacket {
                    sensor_id,
                    sensor_kind: sensor.kind,
                    frame,
                    timestamp: elapsed,
                    payload,
                },
            ));
        }

        (
            SimulationStep {
                frame,
                delta_seconds: delta,
            },
            deliveries,
        )
    }
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorClient for MockSimulator {
    #[instrument(name = "mock_sim_connect", skip(self), fields(host = %host, port))]
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let _ = timeout;
        self.lock().connected = true;
        Ok(())
    }

    async fn available_maps(&self) -> Result<Vec<String>> {
        Self::ensure_connected(&self.lock())?;
        Ok(self.world.maps.clone())
    }

    #[instrument(name = "mock_sim_load_world", skip(self))]
    async fn load_world(&self, map: &str) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        if !self.world.maps.iter().any(|m| m == map) {
            return Err(ActorFactoryError::MapUnavailable {
                map: map.to_string(),
                available: self.world.maps.clone(),
            });
        }
        state.current_map = Some(map.to_string());
        state.parked_enabled = self.world.parked_vehicles;
        Ok(())
    }

    async fn settings(&self) -> Result<WorldSettings> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(state.settings)
    }

    async fn apply_settings(&self, settings: WorldSettings) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.settings = settings;
        state.applied_settings.push(settings);
        Ok(())
    }

    async fn configure_traffic_manager(
        &self,
        port: u16,
        synchronous: bool,
        leading_distance: f64,
    ) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.traffic_manager = Some((port, synchronous, leading_distance));
        Ok(())
    }

    async fn set_sun_altitude(&self, degrees: f64) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.sun_altitude = Some(degrees);
        Ok(())
    }

    async fn disable_environment_objects(&self, labels: &[EnvironmentLabel]) -> Result<usize> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.disabled_labels.extend_from_slice(labels);
        if labels.is_empty() {
            return Ok(0);
        }
        Ok(std::mem::take(&mut state.parked_enabled))
    }

    async fn tick(&self) -> Result<SimulationStep> {
        let (step, deliveries) = {
            let mut state = self.lock();
            Self::ensure_connected(&state)?;
            let next = state.frame + 1;
            if self.faults.failing_tick == Some(next) {
                return Err(ActorFactoryError::simulator(
                    "tick",
                    format!("injected tick failure at frame {next}"),
                ));
            }
            let delta = state.settings.fixed_delta_seconds.unwrap_or(0.05);
            self.step_locked(&mut state, delta)
        };

        // callbacks run outside the world lock, like CARLA's delivery threads
        for (slot, packet) in deliveries {
            slot.deliver(packet);
        }
        self.frames.send_replace(step.frame);
        trace!(frame = step.frame, "mock tick");
        Ok(step)
    }

    async fn spawn_points(&self) -> Result<Vec<Transform>> {
        Self::ensure_connected(&self.lock())?;
        Ok((0..self.world.spawn_points).map(Self::spawn_point).collect())
    }

    async fn vehicle_blueprints(&self, filter: &str) -> Result<Vec<BlueprintInfo>> {
        Self::ensure_connected(&self.lock())?;
        Ok(self
            .world
            .catalog
            .iter()
            .filter(|bp| wildcard_match(filter, &bp.id))
            .cloned()
            .collect())
    }

    #[instrument(name = "mock_sim_spawn_vehicle", skip(self, request), fields(blueprint = %request.blueprint))]
    async fn spawn_vehicle(&self, request: &SpawnRequest) -> Result<ActorId> {
        let mut state = self.lock();
        self.spawn_vehicle_locked(&mut state, request, None)
    }

    #[instrument(name = "mock_sim_spawn_batch", skip(self, requests), fields(count = requests.len()))]
    async fn spawn_batch(
        &self,
        requests: Vec<SpawnRequest>,
        tm_port: u16,
    ) -> Result<Vec<BatchResponse<ActorId>>> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(requests
            .iter()
            .enumerate()
            .map(|(idx, request)| {
                if self.faults.failing_batch_entries.contains(&idx) {
                    return Err("Spawn failed because of collision at spawn position".to_string());
                }
                self.spawn_vehicle_locked(&mut state, request, Some(tm_port))
                    .map_err(|e| e.to_string())
            })
            .collect())
    }

    #[instrument(
        name = "mock_sim_spawn_sensor",
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
        let mut state = self.lock();
        Self::ensure_connected(&state)?;

        let kind = match blueprint {
            "sensor.camera.rgb" => SensorKind::Camera,
            "sensor.lidar.ray_cast_semantic" => SensorKind::SemanticLidar,
            other => {
                return Err(ActorFactoryError::sensor_spawn(
                    other,
                    parent_id,
                    "blueprint not found",
                ))
            }
        };
        let parent = state
            .actors
            .get(&parent_id)
            .map(|actor| actor.transform)
            .ok_or_else(|| {
                ActorFactoryError::sensor_spawn(blueprint, parent_id, "parent actor not found")
            })?;

        let actor_id = state.next_actor_id;
        state.next_actor_id += 1;
        state.actors.insert(
            actor_id,
            MockActor {
                type_id: blueprint.to_string(),
                transform: compose(&parent, &transform),
                velocity: Vector3::default(),
                bounding_box: BoundingBox3D::default(),
                role: ActorRole::Sensor(SensorState {
                    kind,
                    parent: parent_id,
                    mount: transform,
                    attributes: attributes.clone(),
                    since_last: 0.0,
                    slot: ListenerSlot::new(),
                }),
            },
        );
        Ok(actor_id)
    }

    async fn set_autopilot(&self, actor_id: ActorId, enabled: bool, tm_port: u16) -> Result<()> {
        match self.lock().actors.get_mut(&actor_id).map(|actor| &mut actor.role) {
            Some(ActorRole::Vehicle(vehicle)) => {
                vehicle.autopilot = enabled;
                vehicle.tm_port = enabled.then_some(tm_port);
                Ok(())
            }
            _ => Err(ActorFactoryError::Contract(
                contracts::ContractError::ActorNotFound { actor_id },
            )),
        }
    }

    async fn set_light_state(&self, actor_id: ActorId, lights: LightState) -> Result<()> {
        match self.lock().actors.get_mut(&actor_id).map(|actor| &mut actor.role) {
            Some(ActorRole::Vehicle(vehicle)) => {
                vehicle.lights = lights;
                Ok(())
            }
            _ => Err(ActorFactoryError::Contract(
                contracts::ContractError::ActorNotFound { actor_id },
            )),
        }
    }

    async fn set_spectator_transform(&self, transform: Transform) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        state.spectator.push(transform);
        Ok(())
    }

    #[instrument(name = "mock_sim_destroy_actor", skip(self), fields(actor_id))]
    async fn destroy_actor(&self, actor_id: ActorId) -> Result<()> {
        let mut state = self.lock();
        self.destroy_locked(&mut state, actor_id)
    }

    #[instrument(name = "mock_sim_destroy_batch", skip(self, actor_ids), fields(count = actor_ids.len()))]
    async fn destroy_batch(&self, actor_ids: &[ActorId]) -> Result<Vec<BatchResponse<()>>> {
        let mut state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(actor_ids
            .iter()
            .map(|id| self.destroy_locked(&mut state, *id).map_err(|e| e.to_string()))
            .collect())
    }

    async fn vehicles(&self) -> Result<Vec<VehicleSnapshot>> {
        let state = self.lock();
        Self::ensure_connected(&state)?;
        Ok(state
            .actors
            .iter()
            .filter(|(_, actor)| matches!(actor.role, ActorRole::Vehicle(_)))
            .map(|(id, actor)| VehicleSnapshot {
                id: *id,
                type_id: actor.type_id.clone(),
                transform: actor.transform,
                velocity: actor.velocity,
                bounding_box: actor.bounding_box,
            })
            .collect())
    }

    fn tick_source(&self) -> Box<dyn SensorSource> {
        let slot = ListenerSlot::new();
        self.lock().tick_listeners.push(slot.clone());
        Box::new(MockSensor::new(
            WORLD_TICK_ID.to_string(),
            SensorKind::WorldTick,
            slot,
        ))
    }

    fn sensor_source(
        &self,
        actor_id: ActorId,
        sensor_id: String,
        sensor_kind: SensorKind,
    ) -> Option<Box<dyn SensorSource>> {
        match &self.lock().actors.get(&actor_id)?.role {
            ActorRole::Sensor(sensor) if sensor.kind == sensor_kind => Some(Box::new(
                MockSensor::new(sensor_id, sensor_kind, sensor.slot.clone()),
            )),
            _ => None,
        }
    }
}

/// Parent pose composed with a mount offset (rotation-free offset)
fn compose(parent: &Transform, mount: &Transform) -> Transform {
    let yaw = parent.rotation.yaw.to_radians();
    let (sin, cos) = yaw.sin_cos();
    Transform {
        location: Location {
            x: parent.location.x + mount.location.x * cos - mount.location.y * sin,
            y: parent.location.y + mount.location.x * sin + mount.location.y * cos,
            z: parent.location.z + mount.location.z,
        },
        rotation: Rotation {
            pitch: parent.rotation.pitch + mount.rotation.pitch,
            yaw: parent.rotation.yaw + mount.rotation.yaw,
            roll: parent.rotation.roll + mount.rotation.roll,
        },
    }
}

/// Injected drop entries may name the sensor kind instead of the actor
fn sensor_kind_matches(id: &str, kind: SensorKind) -> bool {
    matches!(
        (id, kind),
        ("camera", SensorKind::Camera)
            | ("semantic_lidar", SensorKind::SemanticLidar)
            | ("world_tick", SensorKind::WorldTick)
    )
}

/// `*`-only wildcard matching used by blueprint filters
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn extent_for(base_type: &str) -> Vector3 {
    match base_type {
        "truck" => Vector3::new(3.6, 1.3, 1.7),
        "van" => Vector3::new(2.6, 1.0, 1.2),
        "bus" => Vector3::new(5.8, 1.5, 1.8),
        "motorcycle" | "bicycle" => Vector3::new(1.0, 0.4, 0.8),
        _ => Vector3::new(2.3, 1.0, 0.75),
    }
}

fn blueprint(id: &str, base_type: &str, two_wheeled: bool) -> BlueprintInfo {
    let mut attributes = HashMap::from([
        ("base_type".to_string(), base_type.to_string()),
        ("role_name".to_string(), String::new()),
    ]);
    let mut recommended = HashMap::new();
    if two_wheeled {
        attributes.insert("driver_id".to_string(), "0".to_string());
        recommended.insert(
            "driver_id".to_string(),
            vec!["0".to_string(), "1".to_string(), "2".to_string()],
        );
    } else {
        attributes.insert("color".to_string(), "255,255,255".to_string());
        recommended.insert(
            "color".to_string(),
            vec![
                "255,255,255".to_string(),
                "17,37,103".to_string(),
                "188,0,0".to_string(),
            ],
        );
    }
    BlueprintInfo {
        id: id.to_string(),
        attributes,
        recommended_values: recommended,
    }
}

/// Small catalog covering every reference class plus the override cases
pub fn default_catalog() -> Vec<BlueprintInfo> {
    vec![
        blueprint("vehicle.audi.tt", "car", false),
        blueprint("vehicle.tesla.model3", "car", false),
        blueprint("vehicle.bmw.grandtourer", "van", false),
        blueprint("vehicle.mini.cooper_s", "Car", false),
        blueprint("vehicle.carlamotors.carlacola", "truck", false),
        blueprint("vehicle.mercedes.sprinter", "Van", false),
        blueprint("vehicle.mitsubishi.fusorosa", "bus", false),
        blueprint("vehicle.yamaha.yzf", "motorcycle", true),
        blueprint("vehicle.bh.crossbike", "bicycle", true),
        blueprint("vehicle.micro.microlino", "", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn connected() -> MockSimulator {
        let mut sim = MockSimulator::new();
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim.apply_settings(WorldSettings {
            synchronous_mode: true,
            fixed_delta_seconds: Some(0.5),
        })
        .await
        .unwrap();
        sim
    }

    fn request(blueprint: &str, index: usize) -> SpawnRequest {
        SpawnRequest {
            blueprint: blueprint.to_string(),
            transform: MockSimulator::spawn_point(index),
            attributes: HashMap::new(),
            autopilot: true,
        }
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("vehicle.*", "vehicle.audi.tt"));
        assert!(wildcard_match("*.tt", "vehicle.audi.tt"));
        assert!(wildcard_match("vehicle.*.tt", "vehicle.audi.tt"));
        assert!(!wildcard_match("walker.*", "vehicle.audi.tt"));
        assert!(wildcard_match("vehicle.audi.tt", "vehicle.audi.tt"));
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let sim = MockSimulator::new();
        assert!(sim.available_maps().await.is_err());
    }

    #[tokio::test]
    async fn test_tick_advances_frame_and_notifies() {
        let sim = connected().await;
        let mut frames = sim.subscribe_frames();
        let step = sim.tick().await.unwrap();
        assert_eq!(step.frame, 1);
        assert_eq!(step.delta_seconds, 0.5);
        frames.changed().await.unwrap();
        assert_eq!(*frames.borrow(), 1);
    }

    #[tokio::test]
    async fn test_spawn_collision_and_destroy_idempotent() {
        let sim = connected().await;
        let id = sim.spawn_vehicle(&request("vehicle.audi.tt", 0)).await.unwrap();
        assert!(sim.spawn_vehicle(&request("vehicle.audi.tt", 0)).await.is_err());

        sim.destroy_actor(id).await.unwrap();
        sim.destroy_actor(id).await.unwrap();
        assert_eq!(sim.actor_count(), 0);
        assert_eq!(sim.destroy_requests(), vec![id, id]);
    }

    #[tokio::test]
    async fn test_batch_entries_fail_independently() {
        let mut sim = MockSimulator::with_config(
            MockWorldConfig::default(),
            MockFaults {
                failing_batch_entries: vec![1],
                ..Default::default()
            },
        );
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        let responses = sim
            .spawn_batch(
                vec![
                    request("vehicle.audi.tt", 0),
                    request("vehicle.audi.tt", 1),
                    request("vehicle.audi.tt", 2),
                ],
                8000,
            )
            .await
            .unwrap();
        assert!(responses[0].is_ok());
        assert!(responses[1].is_err());
        assert!(responses[2].is_ok());
        assert_eq!(sim.actor_count(), 2);
    }

    #[tokio::test]
    async fn test_sensor_tick_controls_delivery() {
        let sim = connected().await;
        let ego = sim.spawn_vehicle(&request("vehicle.audi.tt", 0)).await.unwrap();
        let attributes = HashMap::from([("sensor_tick".to_string(), "1.0".to_string())]);
        let lidar = sim
            .spawn_sensor(
                "sensor.lidar.ray_cast_semantic",
                Transform::from_location(1.5, 0.0, 2.4),
                ego,
                &attributes,
            )
            .await
            .unwrap();

        let source = sim
            .sensor_source(lidar, "lidar".into(), SensorKind::SemanticLidar)
            .unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let seen = frames.clone();
        source.listen(Arc::new(move |packet| {
            seen.lock().unwrap().push(packet.frame);
        }));

        for _ in 0..4 {
            sim.tick().await.unwrap();
        }
        // 0.5 s steps with a 1.0 s sensor tick: every second frame
        assert_eq!(*frames.lock().unwrap(), vec![2, 4]);
        assert!(sim
            .sensor_source(lidar, "lidar".into(), SensorKind::Camera)
            .is_none());
    }

    #[tokio::test]
    async fn test_world_tick_snapshot_contains_actors() {
        let sim = connected().await;
        let ego = sim.spawn_vehicle(&request("vehicle.audi.tt", 0)).await.unwrap();
        let source = sim.tick_source();
        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        source.listen(Arc::new(move |packet| {
            if let SensorPayload::WorldSnapshot(snapshot) = packet.payload {
                assert!(snapshot.find(ego).is_some());
                assert_eq!(snapshot.frame, packet.frame);
                seen.fetch_add(1, Ordering::Relaxed);
            }
        }));
        sim.tick().await.unwrap();
        sim.tick().await.unwrap();
        source.stop();
        sim.tick().await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_injected_tick_failure() {
        let mut sim = MockSimulator::with_config(
            MockWorldConfig::default(),
            MockFaults {
                failing_tick: Some(2),
                ..Default::default()
            },
        );
        sim.connect("localhost", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(sim.tick().await.is_ok());
        assert!(sim.tick().await.is_err());
    }
}
