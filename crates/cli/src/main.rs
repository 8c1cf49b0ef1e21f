//! # CARLA Collector CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - configuration loading, overrides and validation
//! - one acquisition session per `run`, interruptible with Ctrl+C
//! - class registry construction

mod cli;
mod commands;
mod settings;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_build_registry, run_collector, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let metrics_port = match &cli.command {
        Commands::Run(args) if args.metrics_port != 0 => Some(args.metrics_port),
        _ => None,
    };
    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port,
        default_log_level: ObservabilityConfig::level_for(cli.verbose, cli.quiet).to_string(),
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "CARLA Collector CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_collector(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::BuildRegistry(args) => run_build_registry(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
