//! Actor Lifecycle Manager
//!
//! Prepares the world, spawns traffic, the ego vehicle and its sensors, and
//! tears everything down again. Every spawned id goes into an
//! `ActorRegistry`, and `teardown` issues a destroy request for each of them.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{ActorId, ActorRegistry, EgoConfig, SensorConfig, SensorKind, TrafficConfig, Transform, WorldConfig};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use tracing::{error, info, instrument, warn};

use crate::client::{
    BlueprintInfo, EnvironmentLabel, LightState, SimulatorClient, SpawnRequest, WorldSettings,
};
use crate::error::{ActorFactoryError, Result};

/// Outcome of world preparation
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWorld {
    /// Asset path of the loaded map
    pub map: String,

    /// Whether this process switched the world to synchronous mode
    pub synchronous_master: bool,

    /// Parked vehicles disabled in the map
    pub parked_disabled: usize,
}

/// Outcome of the traffic batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficReport {
    pub requested: usize,

    /// Count after clamping to the available spawn points
    pub attempted: usize,

    pub spawned: usize,
    pub failed: usize,
}

/// A sensor attached to the ego vehicle
#[derive(Debug, Clone)]
pub struct SpawnedSensor {
    pub actor_id: ActorId,
    pub config: SensorConfig,
}

impl SpawnedSensor {
    pub fn sensor_id(&self) -> &str {
        &self.config.id
    }

    pub fn kind(&self) -> SensorKind {
        self.config.sensor_kind
    }
}

/// Outcome of teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    pub sensors_destroyed: usize,
    pub vehicles_destroyed: usize,

    /// Destroy requests that failed (logged, not retried)
    pub failures: usize,

    pub settings_restored: bool,
}

/// Actor Lifecycle Manager
///
/// Owns the actor registry for one run. Not shared: the control task drives
/// it from a single place.
pub struct LifecycleManager<C: SimulatorClient> {
    client: Arc<C>,
    registry: ActorRegistry,
    sensors: Vec<SpawnedSensor>,
    ego: Option<ActorId>,
    free_spawn_points: Vec<Transform>,
    synchronous_master: bool,
    prepared: bool,
    rng: StdRng,
}

impl<C: SimulatorClient> LifecycleManager<C> {
    /// Create a manager; `seed` makes spawn point and archetype choice reproducible
    pub fn new(client: Arc<C>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            client,
            registry: ActorRegistry::new(),
            sensors: Vec::new(),
            ego: None,
            free_spawn_points: Vec::new(),
            synchronous_master: false,
            prepared: false,
            rng,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn ego(&self) -> Option<ActorId> {
        self.ego
    }

    pub fn sensors(&self) -> &[SpawnedSensor] {
        &self.sensors
    }

    /// Sensor of the given kind, if attached
    pub fn sensor_of_kind(&self, kind: SensorKind) -> Option<&SpawnedSensor> {
        self.sensors.iter().find(|sensor| sensor.kind() == kind)
    }

    /// Load the map and configure stepping, traffic manager and weather
    ///
    /// The map check happens before any world mutation.
    #[instrument(name = "lifecycle_prepare_world", skip(self, world, traffic), fields(map = %world.map))]
    pub async fn prepare_world(
        &mut self,
        world: &WorldConfig,
        traffic: &TrafficConfig,
    ) -> Result<PreparedWorld> {
        let map = world.map_path();
        let available = self.client.available_maps().await?;
        if !available.contains(&map) {
            return Err(ActorFactoryError::MapUnavailable { map, available });
        }

        self.client.load_world(&map).await?;
        self.prepared = true;
        info!(map = %map, "map loaded");

        self.client
            .configure_traffic_manager(traffic.tm_port, true, traffic.leading_distance)
            .await?;
        self.client.set_sun_altitude(world.sun_altitude).await?;
        info!(sun_altitude = world.sun_altitude, "weather set");

        let parked_disabled = if world.remove_parked_vehicles {
            let n = self
                .client
                .disable_environment_objects(&EnvironmentLabel::PARKED_VEHICLES)
                .await?;
            info!(parked = n, "parked vehicles removed");
            n
        } else {
            0
        };

        let settings = self.client.settings().await?;
        if settings.synchronous_mode {
            warn!("world already synchronous, leaving stepping settings untouched");
            self.synchronous_master = false;
        } else {
            self.client
                .apply_settings(WorldSettings {
                    synchronous_mode: true,
                    fixed_delta_seconds: Some(world.fixed_delta_seconds),
                })
                .await?;
            self.synchronous_master = true;
            info!(fixed_delta = world.fixed_delta_seconds, "synchronous mode enabled");
        }

        Ok(PreparedWorld {
            map,
            synchronous_master: self.synchronous_master,
            parked_disabled,
        })
    }

    /// Spawn background traffic in one batch
    ///
    /// One spawn point is kept free for the ego vehicle; a larger request is
    /// clamped with a warning. Failed entries are logged and skipped.
    #[instrument(name = "lifecycle_spawn_traffic", skip(self, traffic), fields(requested = traffic.vehicles))]
    pub async fn spawn_traffic(&mut self, traffic: &TrafficConfig) -> Result<TrafficReport> {
        let mut points = self.client.spawn_points().await?;
        let blueprints = self.vehicle_blueprints(&traffic.blueprint_filter).await?;

        let capacity = points.len().saturating_sub(1);
        let requested = traffic.vehicles;
        let attempted = if requested > capacity {
            warn!(
                requested,
                spawn_points = points.len(),
                "requested more vehicles than spawn points, clamping"
            );
            capacity
        } else {
            requested
        };
        if requested < points.len() {
            points.shuffle(&mut self.rng);
        }

        let traffic_points: Vec<Transform> = points.drain(..attempted).collect();
        self.free_spawn_points = points;

        let mut requests = Vec::with_capacity(attempted);
        for transform in traffic_points {
            let Some(blueprint) = blueprints.choose(&mut self.rng) else {
                break;
            };
            let attributes = self.randomized_attributes(blueprint);
            requests.push(SpawnRequest {
                blueprint: blueprint.id.clone(),
                transform,
                attributes,
                autopilot: true,
            });
        }

        let responses = self.client.spawn_batch(requests, traffic.tm_port).await?;
        let mut report = TrafficReport {
            requested,
            attempted,
            ..Default::default()
        };
        for response in responses {
            match response {
                Ok(actor_id) => {
                    self.registry.register_vehicle(actor_id);
                    report.spawned += 1;
                }
                Err(message) => {
                    error!(error = %message, "traffic spawn entry failed");
                    report.failed += 1;
                }
            }
        }

        info!(spawned = report.spawned, failed = report.failed, "traffic spawned");
        Ok(report)
    }

    /// Spawn the ego vehicle on a spawn point not used by traffic, autopilot on
    #[instrument(name = "lifecycle_spawn_ego", skip(self, ego))]
    pub async fn spawn_ego(&mut self, ego: &EgoConfig, tm_port: u16) -> Result<ActorId> {
        let blueprint = match &ego.blueprint {
            Some(id) => id.clone(),
            None => self
                .vehicle_blueprints(&ego.blueprint_filter)
                .await?
                .choose(&mut self.rng)
                .map(|bp| bp.id.clone())
                .ok_or_else(|| ActorFactoryError::BlueprintNotFound {
                    filter: ego.blueprint_filter.clone(),
                })?,
        };

        if self.free_spawn_points.is_empty() {
            self.free_spawn_points = self.client.spawn_points().await?;
        }
        let mut candidates = std::mem::take(&mut self.free_spawn_points);
        candidates.shuffle(&mut self.rng);

        let mut last_error = None;
        while let Some(transform) = candidates.pop() {
            let request = SpawnRequest {
                blueprint: blueprint.clone(),
                transform,
                attributes: HashMap::new(),
                autopilot: false,
            };
            match self.client.spawn_vehicle(&request).await {
                Ok(actor_id) => {
                    self.registry.register_vehicle(actor_id);
                    self.ego = Some(actor_id);
                    self.free_spawn_points = candidates;
                    self.client.set_autopilot(actor_id, true, tm_port).await?;
                    info!(actor_id, blueprint = %blueprint, "ego vehicle ready");
                    return Ok(actor_id);
                }
                Err(e) => {
                    warn!(error = %e, "ego spawn point rejected, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ActorFactoryError::NoSpawnPoints {
            purpose: "ego vehicle".into(),
        }))
    }

    /// Force Position | LowBeam lights on every live vehicle
    #[instrument(name = "lifecycle_apply_lights", skip(self))]
    pub async fn apply_uniform_lights(&self) -> Result<usize> {
        let state = LightState::POSITION | LightState::LOW_BEAM;
        let mut updated = 0;
        for vehicle in self.client.vehicles().await? {
            match self.client.set_light_state(vehicle.id, state).await {
                Ok(()) => updated += 1,
                Err(e) => warn!(actor_id = vehicle.id, error = %e, "failed to set light state"),
            }
        }
        info!(vehicles = updated, "vehicle lights on");
        Ok(updated)
    }

    /// Attach the configured sensor set to the ego vehicle
    #[instrument(name = "lifecycle_attach_sensors", skip(self, ego), fields(count = ego.sensors.len()))]
    pub async fn attach_sensors(&mut self, ego: &EgoConfig) -> Result<Vec<SpawnedSensor>> {
        let parent_id = self.ego.ok_or_else(|| ActorFactoryError::NoSpawnPoints {
            purpose: "sensors (ego vehicle not spawned)".into(),
        })?;

        for config in &ego.sensors {
            let blueprint = config.sensor_kind.blueprint().ok_or_else(|| {
                ActorFactoryError::sensor_spawn(&config.id, parent_id, "sensor kind has no blueprint")
            })?;
            let actor_id = self
                .client
                .spawn_sensor(blueprint, config.transform, parent_id, &config.attributes)
                .await
                .map_err(|e| ActorFactoryError::sensor_spawn(&config.id, parent_id, e.to_string()))?;
            self.registry.register_sensor(actor_id);
            self.sensors.push(SpawnedSensor {
                actor_id,
                config: config.clone(),
            });
            info!(sensor_id = %config.id, actor_id, "sensor ready");
        }

        Ok(self.sensors.clone())
    }

    /// Restore stepping settings and destroy every tracked actor
    ///
    /// Sensors must already be stopped. Never fails: errors are logged and
    /// counted. Calling it twice is harmless.
    #[instrument(
        name = "lifecycle_teardown",
        skip(self),
        fields(vehicle_count = self.registry.vehicles().len(), sensor_count = self.registry.sensors().len())
    )]
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if !self.prepared && self.registry.is_empty() {
            warn!("teardown requested before any resource was created");
            return report;
        }

        if self.synchronous_master {
            match self.client.apply_settings(WorldSettings::default()).await {
                Ok(()) => {
                    report.settings_restored = true;
                    self.synchronous_master = false;
                    info!("synchronous mode disabled");
                }
                Err(e) => warn!(error = %e, "failed to restore world settings"),
            }
        }

        let set = self.registry.drain_for_teardown();
        self.sensors.clear();
        self.ego = None;

        info!(count = set.vehicles.len(), "destroying vehicles");
        let (ok, failed) = self.destroy_all(&set.vehicles).await;
        report.vehicles_destroyed = ok;
        report.failures += failed;

        info!(count = set.sensors.len(), "destroying sensors");
        let (ok, failed) = self.destroy_all(&set.sensors).await;
        report.sensors_destroyed = ok;
        report.failures += failed;

        report
    }

    async fn destroy_all(&self, ids: &[ActorId]) -> (usize, usize) {
        if ids.is_empty() {
            return (0, 0);
        }
        match self.client.destroy_batch(ids).await {
            Ok(responses) => {
                let mut ok = 0;
                let mut failed = 0;
                for (actor_id, response) in ids.iter().zip(responses) {
                    match response {
                        Ok(()) => ok += 1,
                        Err(message) => {
                            error!(actor_id, error = %message, "failed to destroy actor");
                            failed += 1;
                        }
                    }
                }
                (ok, failed)
            }
            Err(e) => {
                error!(count = ids.len(), error = %e, "destroy batch failed");
                (0, ids.len())
            }
        }
    }

    async fn vehicle_blueprints(&self, filter: &str) -> Result<Vec<BlueprintInfo>> {
        let blueprints = self.client.vehicle_blueprints(filter).await?;
        if blueprints.is_empty() {
            return Err(ActorFactoryError::BlueprintNotFound {
                filter: filter.to_string(),
            });
        }
        Ok(blueprints)
    }

    fn randomized_attributes(&mut self, blueprint: &BlueprintInfo) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        for key in ["color", "driver_id"] {
            if let Some(value) = blueprint
                .recommended_values
                .get(key)
                .and_then(|values| values.choose(&mut self.rng))
            {
                attributes.insert(key.to_string(), value.clone());
            }
        }
        attributes.insert("role_name".to_string(), "autopilot".to_string());
        attributes
    }
}
