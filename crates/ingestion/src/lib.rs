//! # Ingestion
//!
//! Sensor delivery channels.
//!
//! Responsibilities:
//! - Register sensor data sources (real, mock or manual) behind `SensorSource`
//! - Give every source its own unbounded queue, filled from the simulator's
//!   callback thread
//! - Hand the receiving ends to the frame synchronizer in registration order,
//!   world tick first
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::IngestionPipeline;
//!
//! let mut pipeline = IngestionPipeline::new(client.tick_source());
//! pipeline.register_sensor_source(client.sensor_source(actor_id, "rgb".into(), SensorKind::Camera)?)?;
//! pipeline.start_all();
//! let channels = pipeline.take_channels()?;
//! ```

mod channel;
mod config;
mod error;
mod manual;
mod pipeline;

pub use channel::SensorChannel;
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use contracts::SensorPacket;
pub use error::{IngestionError, Result};
pub use manual::{ManualHandle, ManualSource};
pub use pipeline::IngestionPipeline;
