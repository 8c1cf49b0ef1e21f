//! # Actor Factory
//!
//! Simulator-facing side of the collector.
//!
//! Responsibilities:
//! - Prepare the world (map, synchronous stepping, traffic manager, lighting)
//! - Spawn traffic, the ego vehicle and its sensors
//! - Tear everything down and restore world settings
//! - Build the vehicle class registry from the blueprint catalog
//! - Provide the `SensorSource` handles the ingestion pipeline listens on
//!
//! ## Feature Flags
//!
//! - `real-carla`: Enable real CARLA client (requires carla crate)

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod mock_client;
pub mod mock_sensor;
pub mod registry_builder;

#[cfg(feature = "real-carla")]
pub mod carla_client;
#[cfg(feature = "real-carla")]
pub mod carla_sensor_source;
#[cfg(feature = "real-carla")]
pub mod sensor_data_converter;

pub use client::{
    BlueprintInfo, EnvironmentLabel, LightState, SimulatorClient, SpawnRequest, WorldSettings,
};
pub use error::{ActorFactoryError, Result};
pub use lifecycle::{LifecycleManager, PreparedWorld, SpawnedSensor, TeardownReport, TrafficReport};
pub use mock_client::{MockFaults, MockSimulator, MockWorldConfig, WORLD_TICK_ID};
pub use registry_builder::{ClassPrompt, RegistryBuilder};

#[cfg(feature = "real-carla")]
pub use carla_client::RealCarlaClient;
