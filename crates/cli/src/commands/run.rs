//! `run` command implementation.

use actor_factory::{MockSimulator, RegistryBuilder, SimulatorClient};
use annotator::ProjectionAnnotator;
use anyhow::{Context, Result};
use contracts::{Annotator, CollectorConfig};
use indicatif::{ProgressBar, ProgressStyle};
use orchestrator::{shutdown_signal, AcquisitionSession, ExitReason, SessionReport};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::connect;
use crate::cli::RunArgs;
use crate::settings;

/// Execute the `run` command
pub async fn run_collector(args: &RunArgs) -> Result<()> {
    let mut config = settings::load(args.connection.config.as_deref())?;
    settings::apply_run_overrides(&mut config, args)?;

    info!(
        map = %config.world.map,
        host = %config.world.carla_host,
        port = config.world.carla_port,
        vehicles = config.traffic.vehicles,
        max_frames = config.capture.max_frames,
        split = %config.dataset.split,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.connection.mock {
        let client = connect(MockSimulator::new(), &config.world).await?;
        return collect(client, config, args.no_progress, true).await;
    }

    #[cfg(feature = "real-carla")]
    {
        let client = connect(actor_factory::RealCarlaClient::new(), &config.world).await?;
        collect(client, config, args.no_progress, false).await
    }

    #[cfg(not(feature = "real-carla"))]
    {
        anyhow::bail!(super::REAL_CARLA_DISABLED)
    }
}

async fn collect<C: SimulatorClient>(
    client: C,
    config: CollectorConfig,
    no_progress: bool,
    mock: bool,
) -> Result<()> {
    let annotator = load_annotator(&client, &config, mock).await?;

    let bar = if no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(config.capture.max_frames)
    };
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta})",
        )?
        .progress_chars("#>-"),
    );
    let progress = bar.clone();

    info!("Starting acquisition...");
    let report = AcquisitionSession::new(Arc::new(client), config, annotator)
        .with_progress(move |captured, _| progress.set_position(captured))
        .run(shutdown_signal())
        .await;

    match report {
        Ok(report) => {
            match report.exit {
                ExitReason::Completed => bar.finish_with_message("done"),
                ExitReason::Interrupted => bar.abandon_with_message("interrupted"),
            }
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e).context("Acquisition failed")
        }
    }
}

/// Projection annotator over the class registry file
///
/// Against the mock simulator a missing file is replaced by an auto-filled
/// registry built from the mock catalog.
async fn load_annotator<C: SimulatorClient>(
    client: &C,
    config: &CollectorConfig,
    mock: bool,
) -> Result<Arc<dyn Annotator>> {
    let path = Path::new(&config.dataset.class_registry_path);
    if path.exists() {
        let annotator = ProjectionAnnotator::from_registry_file(path)
            .with_context(|| format!("Failed to load class registry {}", path.display()))?;
        info!(
            path = %path.display(),
            archetypes = annotator.registry().classification.len(),
            "Class registry loaded"
        );
        return Ok(Arc::new(annotator));
    }
    if !mock {
        anyhow::bail!(
            "Class registry {} not found; run `carla-collector build-registry` first",
            path.display()
        );
    }

    warn!(path = %path.display(), "Class registry not found, deriving one from the mock catalog");
    let mut registry_config = config.registry.clone();
    registry_config.auto_fill = true;
    let registry = RegistryBuilder::new(client, &registry_config)
        .build(&config.traffic.blueprint_filter, None)
        .await?;
    Ok(Arc::new(ProjectionAnnotator::new(registry)))
}

fn print_report(report: &SessionReport) {
    println!();
    match report.exit {
        ExitReason::Completed => println!("✓ Acquisition completed"),
        ExitReason::Interrupted => println!("⚠ Acquisition interrupted"),
    }
    if let Some(ref run_name) = report.run_name {
        println!("  Run: {run_name}");
    }
    println!("  Captured frames: {}", report.captured);
    if let Some(traffic) = report.traffic {
        println!(
            "  Traffic: {}/{} spawned ({} failed)",
            traffic.spawned, traffic.requested, traffic.failed
        );
    }
    println!(
        "  Destroyed: {} vehicles, {} sensors ({} failures)",
        report.teardown.vehicles_destroyed,
        report.teardown.sensors_destroyed,
        report.teardown.failures
    );
    for (name, metrics) in &report.sinks {
        println!(
            "  Sink {name}: {} written, {} failed",
            metrics.write_count, metrics.failure_count
        );
    }
    println!("\n{}", report.summary);
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &CollectorConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("World:");
    println!("  Map: {}", config.world.map);
    println!(
        "  CARLA: {}:{}",
        config.world.carla_host, config.world.carla_port
    );
    println!("  Fixed delta: {} s", config.world.fixed_delta_seconds);
    println!("\nTraffic: {} vehicles (TM port {})", config.traffic.vehicles, config.traffic.tm_port);

    println!("\nEgo sensors ({}):", config.ego.sensors.len());
    for sensor in &config.ego.sensors {
        println!("  - {} ({:?})", sensor.id, sensor.sensor_kind);
    }

    println!(
        "\nCapture: every {} s, {} frames, split {}",
        config.capture.interval_sec, config.capture.max_frames, config.dataset.split
    );
    println!("Class registry: {}", config.dataset.class_registry_path);

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
