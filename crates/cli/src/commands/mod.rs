//! Command implementations.

mod build_registry;
mod prompt;
mod run;
mod validate;

pub use build_registry::run_build_registry;
pub use run::run_collector;
pub use validate::run_validate;

use actor_factory::SimulatorClient;
use anyhow::{Context, Result};
use contracts::WorldConfig;
use std::time::Duration;
use tracing::info;

#[cfg(not(feature = "real-carla"))]
const REAL_CARLA_DISABLED: &str =
    "built without the `real-carla` feature; pass --mock or rebuild with `--features real-carla`";

/// Connect `client` to the server named in `world`
async fn connect<C: SimulatorClient>(mut client: C, world: &WorldConfig) -> Result<C> {
    info!(host = %world.carla_host, port = world.carla_port, "Connecting to simulator");
    let timeout = Duration::try_from_secs_f64(world.timeout_sec)
        .with_context(|| format!("Invalid connection timeout {}", world.timeout_sec))?;
    client
        .connect(&world.carla_host, world.carla_port, timeout)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to CARLA at {}:{}",
                world.carla_host, world.carla_port
            )
        })?;
    Ok(client)
}
