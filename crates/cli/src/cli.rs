//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::DatasetSplit;
use std::path::PathBuf;

/// CARLA Collector - synchronized camera/LiDAR dataset collection for CARLA
#[derive(Parser, Debug)]
#[command(
    name = "carla-collector",
    author,
    version,
    about = "Synchronized CARLA dataset collector",
    long_about = "Drives a CARLA world in synchronous mode, captures RGB camera and semantic \n\
                  LiDAR frames at a fixed simulated-time cadence, labels every vehicle in \n\
                  view and writes the result as JSON sidecars and a darknet training set."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CARLA_COLLECTOR_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "CARLA_COLLECTOR_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one acquisition session
    Run(RunArgs),

    /// Validate a configuration file without connecting
    Validate(ValidateArgs),

    /// Classify every vehicle archetype and write the class registry
    BuildRegistry(BuildRegistryArgs),
}

/// Simulator connection shared by the commands that talk to CARLA
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Configuration file (TOML or JSON); built-in defaults when absent
    #[arg(short, long, env = "CARLA_COLLECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override CARLA server host
    #[arg(long, env = "CARLA_HOST")]
    pub host: Option<String>,

    /// Override CARLA server port
    #[arg(long, env = "CARLA_PORT")]
    pub port: Option<u16>,

    /// Use the in-process simulator instead of a CARLA server
    #[arg(long)]
    pub mock: bool,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Map to load (e.g. Town06)
    #[arg(long, env = "CARLA_COLLECTOR_MAP")]
    pub map: Option<String>,

    /// Background vehicles to spawn
    #[arg(short = 'n', long)]
    pub vehicles: Option<usize>,

    /// Traffic manager port
    #[arg(long)]
    pub tm_port: Option<u16>,

    /// Seed for spawn point and archetype choice
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sun altitude angle in degrees (-90 = night)
    #[arg(long, allow_negative_numbers = true)]
    pub sun_altitude: Option<f64>,

    /// Frames to capture
    #[arg(short = 'f', long = "frames")]
    pub max_frames: Option<u64>,

    /// Simulated seconds between captures
    #[arg(long)]
    pub interval: Option<f64>,

    /// Dataset split the frames are appended to
    #[arg(long)]
    pub split: Option<DatasetSplit>,

    /// Minimum semantic LiDAR hits for a vehicle to be labeled
    #[arg(long)]
    pub min_detect: Option<u32>,

    /// Class registry file written by `build-registry`
    #[arg(long, env = "CARLA_COLLECTOR_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Root of the darknet dataset
    #[arg(long, env = "CARLA_COLLECTOR_DATASET_PATH")]
    pub dataset_path: Option<PathBuf>,

    /// Base directory of the JSON sidecar output
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CARLA_COLLECTOR_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "collector.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `build-registry` command
#[derive(Parser, Debug, Clone)]
pub struct BuildRegistryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Output file; defaults to the configured registry path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Archetype filter
    #[arg(long, default_value = "vehicle.*")]
    pub filter: String,

    /// Ask for every class id instead of deriving it from `base_type`
    #[arg(short, long)]
    pub interactive: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::parse_from([
            "carla-collector",
            "-v",
            "run",
            "--mock",
            "--map",
            "Town03",
            "-n",
            "20",
            "--frames",
            "5",
            "--split",
            "val",
            "--sun-altitude",
            "-45",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.connection.mock);
        assert_eq!(args.map.as_deref(), Some("Town03"));
        assert_eq!(args.vehicles, Some(20));
        assert_eq!(args.max_frames, Some(5));
        assert_eq!(args.split, Some(DatasetSplit::Val));
        assert_eq!(args.sun_altitude, Some(-45.0));
    }

    #[test]
    fn test_unknown_split_rejected() {
        let result = Cli::try_parse_from(["carla-collector", "run", "--split", "test"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_registry_flags() {
        let cli = Cli::parse_from(["carla-collector", "build-registry", "-i", "-o", "classes.json"]);
        let Commands::BuildRegistry(args) = cli.command else {
            panic!("expected build-registry command");
        };
        assert!(args.interactive);
        assert_eq!(args.filter, "vehicle.*");
        assert_eq!(args.output, Some(PathBuf::from("classes.json")));
    }
}
