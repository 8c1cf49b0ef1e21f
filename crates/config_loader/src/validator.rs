//! Config validation
//!
//! Field ranges come from the `validator` derive on the config types.
//! Cross-field rules checked here:
//! - sensor ids unique
//! - exactly one RGB camera and one semantic LiDAR, no world-tick sensor
//! - capture interval not shorter than the fixed step
//! - sink names non-empty and unique, required sink params present

use std::collections::HashSet;

use contracts::{CollectorConfig, ContractError, SensorKind, SinkType};
use validator::Validate;

/// Validate a collector configuration
///
/// Returns the first error encountered.
pub fn validate(config: &CollectorConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_sensor_ids(config)?;
    validate_sensor_set(config)?;
    validate_capture(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_fields(config: &CollectorConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|key| key.to_string())
            .unwrap_or_else(|| "config".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

fn validate_sensor_ids(config: &CollectorConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sensor in &config.ego.sensors {
        if !seen.insert(&sensor.id) {
            return Err(ContractError::config_validation(
                format!("ego.sensors[id={}]", sensor.id),
                "duplicate sensor_id",
            ));
        }
    }
    Ok(())
}

fn validate_sensor_set(config: &CollectorConfig) -> Result<(), ContractError> {
    let count = |kind: SensorKind| {
        config
            .ego
            .sensors
            .iter()
            .filter(|sensor| sensor.sensor_kind == kind)
            .count()
    };

    if count(SensorKind::WorldTick) > 0 {
        return Err(ContractError::config_validation(
            "ego.sensors.sensor_kind",
            "world_tick is implicit and cannot be configured as a sensor",
        ));
    }
    for kind in [SensorKind::Camera, SensorKind::SemanticLidar] {
        let n = count(kind);
        if n != 1 {
            return Err(ContractError::config_validation(
                "ego.sensors.sensor_kind",
                format!("exactly one {kind:?} sensor is required, found {n}"),
            ));
        }
    }
    Ok(())
}

fn validate_capture(config: &CollectorConfig) -> Result<(), ContractError> {
    let interval = config.capture.interval_sec;
    let delta = config.world.fixed_delta_seconds;
    if interval + 1e-9 < delta {
        return Err(ContractError::config_validation(
            "capture.interval_sec",
            format!("interval_sec ({interval}) must be >= world.fixed_delta_seconds ({delta})"),
        ));
    }
    Ok(())
}

fn validate_sinks(config: &CollectorConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.sink_type == SinkType::Darknet && !sink.params.contains_key("dataset_path") {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].params.dataset_path"),
                "darknet sink requires dataset_path",
            ));
        }
    }
    Ok(())
}
