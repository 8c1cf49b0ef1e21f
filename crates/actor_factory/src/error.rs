//! Actor Factory error types

use contracts::{ActorId, ContractError};
use thiserror::Error;

/// Actor Factory specific error
#[derive(Debug, Error)]
pub enum ActorFactoryError {
    /// Simulator connection error
    #[error("failed to connect to CARLA: {message}")]
    ConnectionFailed { message: String },

    /// Requested map is not served by the simulator
    #[error("map '{map}' is not available, available maps: {available:?}")]
    MapUnavailable { map: String, available: Vec<String> },

    /// World has no spawn point left
    #[error("no spawn point available for {purpose}")]
    NoSpawnPoints { purpose: String },

    /// Blueprint catalog has no entry matching a filter
    #[error("no blueprint matches '{filter}'")]
    BlueprintNotFound { filter: String },

    /// Vehicle spawn error
    #[error("failed to spawn vehicle '{blueprint}': {message}")]
    VehicleSpawnFailed { blueprint: String, message: String },

    /// Sensor spawn error
    #[error("failed to spawn sensor '{sensor_id}' on actor {parent_id}: {message}")]
    SensorSpawnFailed {
        sensor_id: String,
        parent_id: ActorId,
        message: String,
    },

    /// Destroy error
    #[error("failed to destroy actor {actor_id}: {message}")]
    DestroyFailed { actor_id: ActorId, message: String },

    /// Operator input for the class registry could not be read
    #[error("class prompt for '{type_id}' failed: {message}")]
    ClassPrompt { type_id: String, message: String },

    /// Any other simulator RPC failure
    #[error("simulator call '{operation}' failed: {message}")]
    Simulator { operation: String, message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl ActorFactoryError {
    /// Create vehicle spawn error
    pub fn vehicle_spawn(blueprint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VehicleSpawnFailed {
            blueprint: blueprint.into(),
            message: message.into(),
        }
    }

    /// Create sensor spawn error
    pub fn sensor_spawn(
        sensor_id: impl Into<String>,
        parent_id: ActorId,
        message: impl Into<String>,
    ) -> Self {
        Self::SensorSpawnFailed {
            sensor_id: sensor_id.into(),
            parent_id,
            message: message.into(),
        }
    }

    /// Create generic simulator call error
    pub fn simulator(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Simulator {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ActorFactoryError>;
