//! Configuration loading and command-line overrides

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{CollectorConfig, SinkType};
use std::path::Path;
use tracing::{debug, info};

use crate::cli::{ConnectionArgs, RunArgs};

/// Load `path`, or the built-in defaults when no file is given
pub fn load(path: Option<&Path>) -> Result<CollectorConfig> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(CollectorConfig::default())
        }
    }
}

pub fn apply_connection(config: &mut CollectorConfig, args: &ConnectionArgs) {
    if let Some(ref host) = args.host {
        debug!(host = %host, "Overriding CARLA host from CLI");
        config.world.carla_host = host.clone();
    }
    if let Some(port) = args.port {
        debug!(port, "Overriding CARLA port from CLI");
        config.world.carla_port = port;
    }
}

/// Apply `run` flags on top of the file, then re-validate
pub fn apply_run_overrides(config: &mut CollectorConfig, args: &RunArgs) -> Result<()> {
    apply_connection(config, &args.connection);

    if let Some(ref map) = args.map {
        config.world.map = map.clone();
    }
    if let Some(sun_altitude) = args.sun_altitude {
        config.world.sun_altitude = sun_altitude;
    }
    if let Some(vehicles) = args.vehicles {
        config.traffic.vehicles = vehicles;
    }
    if let Some(tm_port) = args.tm_port {
        config.traffic.tm_port = tm_port;
    }
    if args.seed.is_some() {
        config.traffic.seed = args.seed;
    }
    if let Some(max_frames) = args.max_frames {
        config.capture.max_frames = max_frames;
    }
    if let Some(interval) = args.interval {
        config.capture.interval_sec = interval;
    }
    if let Some(split) = args.split {
        config.dataset.split = split;
    }
    if let Some(min_detect) = args.min_detect {
        config.dataset.min_detect = min_detect;
    }
    if let Some(ref registry) = args.registry {
        config.dataset.class_registry_path = registry.display().to_string();
    }
    if let Some(ref dataset_path) = args.dataset_path {
        set_sink_param(config, SinkType::Darknet, "dataset_path", dataset_path);
    }
    if let Some(ref output) = args.output {
        set_sink_param(config, SinkType::Sidecar, "base_path", output);
    }

    ConfigLoader::validate(config).context("Configuration invalid after CLI overrides")
}

fn set_sink_param(config: &mut CollectorConfig, sink_type: SinkType, key: &str, path: &Path) {
    for sink in config.sinks.iter_mut().filter(|s| s.sink_type == sink_type) {
        debug!(sink = %sink.name, key, value = %path.display(), "Overriding sink parameter");
        sink.params.insert(key.to_string(), path.display().to_string());
    }
}
