//! Layered error definitions
//!
//! Categorized by source: config / simulator / annotation / sink / registry

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Simulator Errors =====
    /// Simulator connection error
    #[error("simulator connection error: {message}")]
    SimulatorConnection { message: String },

    /// Requested map is not served by the simulator
    #[error("map '{map}' is not available, available maps: {available:?}")]
    MapUnavailable { map: String, available: Vec<String> },

    /// Actor not found
    #[error("actor not found: {actor_id}")]
    ActorNotFound { actor_id: u32 },

    // ===== Annotation Errors =====
    /// Bundle is missing the payload the annotator needs
    #[error("bundle for frame {frame} has no {expected} payload")]
    MissingPayload { frame: u64, expected: String },

    /// Annotation failure
    #[error("annotation failed for frame {frame}: {message}")]
    Annotation { frame: u64, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== Registry Errors =====
    /// Class registry could not be read or written
    #[error("class registry error at '{path}': {message}")]
    Registry { path: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create missing payload error
    pub fn missing_payload(frame: u64, expected: impl Into<String>) -> Self {
        Self::MissingPayload {
            frame,
            expected: expected.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create class registry error
    pub fn registry(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registry {
            path: path.into(),
            message: message.into(),
        }
    }
}
