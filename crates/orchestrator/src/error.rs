//! Orchestrator error types

use actor_factory::ActorFactoryError;
use contracts::{ContractError, SensorKind};
use dataset::DatasetError;
use ingestion::IngestionError;
use thiserror::Error;

/// Acquisition session errors
///
/// Every variant is surfaced only after teardown and finalize have run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// World preparation, spawning or a simulator call failed
    #[error("simulator error: {0}")]
    Simulator(#[from] ActorFactoryError),

    /// A configured sensor could not be wired into ingestion
    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Annotation or dataset commit failed
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Bundle content did not match the world state
    #[error("frame error: {0}")]
    Contract(#[from] ContractError),

    /// Capture settings that cannot drive the loop
    #[error("invalid capture setting {field} = {value}: {message}")]
    InvalidCapture {
        field: &'static str,
        value: f64,
        message: String,
    },

    /// The sensor set lacks a sensor the loop needs
    #[error("no {kind:?} sensor attached to the ego vehicle")]
    MissingSensor { kind: SensorKind },

    /// The simulator has no data source for a spawned sensor
    #[error("sensor '{sensor_id}' (actor {actor_id}) has no data source")]
    SensorSourceUnavailable { sensor_id: String, actor_id: u32 },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
