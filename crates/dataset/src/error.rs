//! Dataset error types

use contracts::FrameId;
use thiserror::Error;

/// Dataset pipeline errors
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Frame handed to the pipeline after finalize
    #[error("dataset pipeline already finalized, frame {frame} rejected")]
    Finalized { frame: FrameId },

    /// Pixel buffer does not match its declared size
    #[error("invalid image: {message}")]
    InvalidImage { message: String },

    /// Annotation or payload error (from contract)
    #[error("annotation error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
