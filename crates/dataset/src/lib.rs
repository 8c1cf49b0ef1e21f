//! # Dataset
//!
//! Dataset Commit Pipeline.
//!
//! Responsibilities:
//! - annotate each accepted `FrameBundle`
//! - fan the annotated frame out to the configured sinks, each behind its own worker
//! - finalize every sink exactly once (split manifest) on any exit path

pub mod error;
pub mod handle;
pub mod image_io;
pub mod metrics;
pub mod pipeline;
pub mod sinks;

#[cfg(test)]
pub(crate) mod test_support;

pub use contracts::{AnnotatedFrame, DatasetSink};
pub use error::{DatasetError, Result};
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use pipeline::{
    run_name, DatasetPipeline, DatasetPipelineBuilder, RunContext, DEFAULT_QUEUE_CAPACITY,
};
pub use sinks::{DarknetSink, DarknetSinkConfig, LogSink, SidecarSink, SidecarSinkConfig};
