//! Deploy command - Materialize the manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tg_engine::{LocalEngine, ProvisioningEngine, ResourceAction};

use super::{GlobalArgs, DEFAULT_STATE_FILE};

#[derive(Args)]
pub struct DeployArgs {
    /// Engine state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state: PathBuf,
}

pub async fn execute(global: &GlobalArgs, args: &DeployArgs) -> Result<()> {
    let synthesis = global.synthesize()?;
    let manifest = &synthesis.manifest;

    let engine = LocalEngine::open(&args.state)
        .await
        .with_context(|| format!("Failed to open engine state {}", args.state.display()))?;
    info!("Deploying {} with the {} engine", manifest.project, engine.name());

    let report = engine
        .materialize(manifest)
        .await
        .with_context(|| format!("Deployment of {} failed", manifest.project))?;

    if report.is_noop() {
        println!("{} is up to date", manifest.project);
    } else {
        for resource in report.resources.iter().filter(|r| r.action.is_change()) {
            println!("   {:<10} {}", resource.action.as_str(), resource.id);
        }
        println!(
            "Deployed {}: {} created, {} updated, {} deleted, {} retained",
            manifest.project,
            report.count(ResourceAction::Created),
            report.count(ResourceAction::Updated),
            report.count(ResourceAction::Deleted),
            report.count(ResourceAction::Retained)
        );
    }

    println!();
    println!("Outputs:");
    for output in &report.outputs {
        println!("   {:<22} {}", output.name, output.value);
    }

    Ok(())
}
