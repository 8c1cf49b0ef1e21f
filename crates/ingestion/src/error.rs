//! Ingestion error types

use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Every sender of the channel is gone (sensor stopped)
    #[error("channel closed for sensor {sensor_id}")]
    ChannelClosed { sensor_id: String },

    /// Channels were already handed out
    #[error("sensor channels already taken")]
    ChannelsTaken,

    /// Sensor id registered twice
    #[error("sensor {sensor_id} is already registered")]
    DuplicateSensor { sensor_id: String },
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
