//! ActorRegistry - Actor Lifecycle Manager bookkeeping
//!
//! Runtime actor handles owned by the control task.

/// Simulator actor handle type
pub type ActorId = u32;

/// Simulator frame identifier (one per world tick)
pub type FrameId = u64;

/// Runtime actor registry
///
/// Tracks every actor this process spawned so that each one eventually
/// receives a destroy request. Owned exclusively by the control task.
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    /// Vehicle actors (traffic + ego), in spawn order
    vehicles: Vec<ActorId>,

    /// Sensor actors, in spawn order
    sensors: Vec<ActorId>,
}

/// Ids handed out by [`ActorRegistry::drain_for_teardown`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownSet {
    pub vehicles: Vec<ActorId>,
    pub sensors: Vec<ActorId>,
}

impl TeardownSet {
    /// Total number of actors to destroy
    pub fn len(&self) -> usize {
        self.vehicles.len() + self.sensors.len()
    }

    /// Whether there is nothing to destroy
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.sensors.is_empty()
    }
}

impl ActorRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register vehicle
    pub fn register_vehicle(&mut self, actor_id: ActorId) {
        if !self.vehicles.contains(&actor_id) {
            self.vehicles.push(actor_id);
        }
    }

    /// Register sensor
    pub fn register_sensor(&mut self, actor_id: ActorId) {
        if !self.sensors.contains(&actor_id) {
            self.sensors.push(actor_id);
        }
    }

    /// Forget an actor that was destroyed outside of teardown
    ///
    /// Returns whether the id was tracked.
    pub fn unregister(&mut self, actor_id: ActorId) -> bool {
        let before = self.len();
        self.vehicles.retain(|id| *id != actor_id);
        self.sensors.retain(|id| *id != actor_id);
        before != self.len()
    }

    /// Tracked vehicle ids
    pub fn vehicles(&self) -> &[ActorId] {
        &self.vehicles
    }

    /// Tracked sensor ids
    pub fn sensors(&self) -> &[ActorId] {
        &self.sensors
    }

    /// Number of tracked actors
    pub fn len(&self) -> usize {
        self.vehicles.len() + self.sensors.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.sensors.is_empty()
    }

    /// Take every tracked id, leaving the registry empty
    ///
    /// A second call returns an empty set, so teardown is idempotent.
    pub fn drain_for_teardown(&mut self) -> TeardownSet {
        TeardownSet {
            vehicles: std::mem::take(&mut self.vehicles),
            sensors: std::mem::take(&mut self.sensors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_deduplicated() {
        let mut registry = ActorRegistry::new();
        registry.register_vehicle(7);
        registry.register_vehicle(7);
        registry.register_sensor(9);
        assert_eq!(registry.vehicles(), &[7]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister() {
        let mut registry = ActorRegistry::new();
        registry.register_vehicle(1);
        registry.register_sensor(2);
        assert!(registry.unregister(2));
        assert!(!registry.unregister(2));
        assert_eq!(registry.sensors(), &[] as &[ActorId]);
    }

    #[test]
    fn test_drain_for_teardown_empties_registry() {
        let mut registry = ActorRegistry::new();
        registry.register_vehicle(1);
        registry.register_vehicle(2);
        registry.register_sensor(3);

        let set = registry.drain_for_teardown();
        assert_eq!(set.vehicles, vec![1, 2]);
        assert_eq!(set.sensors, vec![3]);
        assert!(registry.is_empty());
        assert!(registry.drain_for_teardown().is_empty());
    }
}
