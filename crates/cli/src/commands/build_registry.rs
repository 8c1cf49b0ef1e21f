//! `build-registry` command implementation.

use actor_factory::{MockSimulator, RegistryBuilder, SimulatorClient};
use anyhow::{Context, Result};
use contracts::RegistryConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use super::connect;
use super::prompt::LinePrompt;
use crate::cli::BuildRegistryArgs;
use crate::settings;

/// Execute the `build-registry` command
pub async fn run_build_registry(args: &BuildRegistryArgs) -> Result<()> {
    let mut config = settings::load(args.connection.config.as_deref())?;
    settings::apply_connection(&mut config, &args.connection);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.dataset.class_registry_path));
    let mut registry_config = config.registry.clone();
    if args.interactive {
        registry_config.auto_fill = false;
    }

    if args.connection.mock {
        let client = connect(MockSimulator::new(), &config.world).await?;
        return build(&client, &registry_config, &args.filter, &output).await;
    }

    #[cfg(feature = "real-carla")]
    {
        let client = connect(actor_factory::RealCarlaClient::new(), &config.world).await?;
        build(&client, &registry_config, &args.filter, &output).await
    }

    #[cfg(not(feature = "real-carla"))]
    {
        anyhow::bail!(super::REAL_CARLA_DISABLED)
    }
}

async fn build<C: SimulatorClient>(
    client: &C,
    config: &RegistryConfig,
    filter: &str,
    output: &Path,
) -> Result<()> {
    let builder = RegistryBuilder::new(client, config);
    let registry = if config.auto_fill {
        builder.build(filter, None).await?
    } else {
        println!("Reference classes:");
        for (name, id) in &config.reference {
            println!("  {id}: {name}");
        }
        let stdin = io::stdin();
        let mut prompt = LinePrompt::new(stdin.lock(), io::stdout());
        builder.build(filter, Some(&mut prompt)).await?
    };

    registry
        .save(output)
        .with_context(|| format!("Failed to write class registry to {}", output.display()))?;

    let unclassified: Vec<&str> = registry.unclassified().collect();
    info!(
        path = %output.display(),
        archetypes = registry.classification.len(),
        unclassified = unclassified.len(),
        "Class registry written"
    );
    println!(
        "✓ {} archetypes classified into {}",
        registry.classification.len(),
        output.display()
    );
    if !unclassified.is_empty() {
        println!("⚠ Without a class (ignored when labeling):");
        for type_id in unclassified {
            println!("  - {type_id}");
        }
    }
    Ok(())
}
