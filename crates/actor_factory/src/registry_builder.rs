//! Class Registry Builder
//!
//! Walks the vehicle catalog and assigns every archetype a ground-truth class
//! id, either from its `base_type` attribute or from operator input. Each
//! archetype is spawned once so its attributes can be inspected, and the
//! transient actor is destroyed before moving on, whatever the outcome.

use contracts::{ActorId, ClassId, ClassRegistry, Location, RegistryConfig, Rotation, Transform};
use tracing::{error, info, instrument, warn};

use crate::client::{BlueprintInfo, SimulatorClient, SpawnRequest};
use crate::error::{ActorFactoryError, Result};

/// Spectator offset from the probe vehicle
const SPECTATOR_DISTANCE: f64 = 6.4;
const SPECTATOR_HEIGHT: f64 = 2.0;
const SPECTATOR_ANGLE_DEG: f64 = -30.0;
const SPECTATOR_PITCH_DEG: f64 = -15.0;

/// Spectator pose looking back at a vehicle parked at `target`
pub fn spectator_view(target: &Location) -> Transform {
    let angle = SPECTATOR_ANGLE_DEG.to_radians();
    Transform {
        location: Location {
            x: target.x + SPECTATOR_DISTANCE * angle.cos(),
            y: target.y + SPECTATOR_DISTANCE * angle.sin(),
            z: target.z + SPECTATOR_HEIGHT,
        },
        rotation: Rotation {
            pitch: SPECTATOR_PITCH_DEG,
            yaw: 180.0 + SPECTATOR_ANGLE_DEG,
            roll: 0.0,
        },
    }
}

/// Operator input for interactive classification
pub trait ClassPrompt {
    /// Ask for the class id of one archetype
    fn ask(&mut self, type_id: &str) -> std::io::Result<ClassId>;
}

/// Builds a [`ClassRegistry`] from the simulator catalog
pub struct RegistryBuilder<'a, C: SimulatorClient> {
    client: &'a C,
    config: &'a RegistryConfig,
}

impl<'a, C: SimulatorClient> RegistryBuilder<'a, C> {
    pub fn new(client: &'a C, config: &'a RegistryConfig) -> Self {
        Self { client, config }
    }

    /// Class id derived from attributes: override table first, then `base_type`
    pub fn auto_class(&self, blueprint: &BlueprintInfo) -> Option<ClassId> {
        if let Some(id) = self.config.overrides.get(&blueprint.id) {
            return Some(*id);
        }
        let base_type = blueprint.attribute("base_type")?.to_lowercase();
        self.config.reference.get(&base_type).copied()
    }

    /// Classify every archetype matching `filter`
    ///
    /// `prompt` is only consulted when auto-fill is disabled.
    #[instrument(name = "registry_build", skip(self, prompt), fields(auto_fill = self.config.auto_fill))]
    pub async fn build(
        &self,
        filter: &str,
        mut prompt: Option<&mut dyn ClassPrompt>,
    ) -> Result<ClassRegistry> {
        let blueprints = self.client.vehicle_blueprints(filter).await?;
        let spawn_points = self.client.spawn_points().await?;
        if spawn_points.is_empty() {
            return Err(ActorFactoryError::NoSpawnPoints {
                purpose: "registry probe vehicle".into(),
            });
        }

        let mut registry = ClassRegistry::new(self.config.reference.clone());
        for blueprint in &blueprints {
            let class_id = self
                .classify(blueprint, &spawn_points, prompt.as_deref_mut())
                .await?;
            info!(type_id = %blueprint.id, class = ?class_id, "classified");
            registry.insert(blueprint.id.clone(), class_id);
        }

        let unclassified = registry.unclassified().count();
        if unclassified > 0 {
            warn!(unclassified, "archetypes without a reference class recorded as null");
        }
        Ok(registry)
    }

    async fn classify(
        &self,
        blueprint: &BlueprintInfo,
        spawn_points: &[Transform],
        prompt: Option<&mut (dyn ClassPrompt + '_)>,
    ) -> Result<Option<ClassId>> {
        let Some((actor_id, transform)) = self.spawn_probe(blueprint, spawn_points).await else {
            return Ok(None);
        };
        if let Err(e) = self
            .client
            .set_spectator_transform(spectator_view(&transform.location))
            .await
        {
            warn!(type_id = %blueprint.id, error = %e, "failed to move spectator to probe vehicle");
        }

        let resolved = if self.config.auto_fill {
            Ok(self.auto_class(blueprint))
        } else {
            match prompt {
                Some(prompt) => prompt
                    .ask(&blueprint.id)
                    .map(Some)
                    .map_err(|e| ActorFactoryError::ClassPrompt {
                        type_id: blueprint.id.clone(),
                        message: e.to_string(),
                    }),
                None => Err(ActorFactoryError::ClassPrompt {
                    type_id: blueprint.id.clone(),
                    message: "interactive mode without a prompt".into(),
                }),
            }
        };

        if let Err(e) = self.client.destroy_actor(actor_id).await {
            error!(actor_id, error = %e, "failed to destroy probe vehicle");
        }
        resolved
    }

    /// Spawn one instance of the archetype; `None` if no spawn point accepts it
    async fn spawn_probe(
        &self,
        blueprint: &BlueprintInfo,
        spawn_points: &[Transform],
    ) -> Option<(ActorId, Transform)> {
        for transform in spawn_points {
            let request = SpawnRequest {
                blueprint: blueprint.id.clone(),
                transform: *transform,
                attributes: Default::default(),
                autopilot: false,
            };
            match self.client.spawn_vehicle(&request).await {
                Ok(actor_id) => return Some((actor_id, *transform)),
                Err(e @ ActorFactoryError::VehicleSpawnFailed { .. })
                    if e.to_string().contains("collision") =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(type_id = %blueprint.id, error = %e, "probe spawn failed, recording null");
                    return None;
                }
            }
        }
        warn!(type_id = %blueprint.id, "no free spawn point for probe, recording null");
        None
    }
}
