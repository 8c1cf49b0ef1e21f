//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CollectorConfig, SinkType};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    map: String,
    vehicles: usize,
    sensor_count: usize,
    max_frames: u64,
    split: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    map: config.world.map.clone(),
                    vehicles: config.traffic.vehicles,
                    sensor_count: config.ego.sensors.len(),
                    max_frames: config.capture.max_frames,
                    split: config.dataset.split.to_string(),
                    sink_count: config.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &CollectorConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config
        .sinks
        .iter()
        .any(|s| matches!(s.sink_type, SinkType::Sidecar | SinkType::Darknet))
    {
        warnings.push("No file sink configured - captured frames are only logged".to_string());
    }

    if !Path::new(&config.dataset.class_registry_path).exists() {
        warnings.push(format!(
            "Class registry {} does not exist yet - run `build-registry` first",
            config.dataset.class_registry_path
        ));
    }

    if config.dataset.min_detect == 0 {
        warnings.push("dataset.min_detect is 0 - vehicles without LiDAR hits get labeled".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Map: {}", summary.map);
            println!("  Vehicles: {}", summary.vehicles);
            println!("  Sensors: {}", summary.sensor_count);
            println!("  Frames: {} ({})", summary.max_frames, summary.split);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
