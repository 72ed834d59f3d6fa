//! Destroy command - Tear the stack down.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tg_engine::{LocalEngine, ProvisioningEngine};

use super::{GlobalArgs, DEFAULT_STATE_FILE};

#[derive(Args)]
pub struct DestroyArgs {
    /// Engine state file
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state: PathBuf,
}

pub async fn execute(global: &GlobalArgs, args: &DestroyArgs) -> Result<()> {
    let synthesis = global.synthesize()?;
    let manifest = &synthesis.manifest;

    let engine = LocalEngine::open(&args.state)
        .await
        .with_context(|| format!("Failed to open engine state {}", args.state.display()))?;
    info!("Destroying {} with the {} engine", manifest.project, engine.name());

    let report = engine
        .teardown(manifest)
        .await
        .with_context(|| format!("Teardown of {} failed", manifest.project))?;

    let retained: Vec<_> = report.retained().collect();
    println!(
        "Destroyed {}: {} deleted, {} retained",
        manifest.project,
        report.deleted().count(),
        retained.len()
    );
    for id in retained {
        println!("   retained   {}", id);
    }

    Ok(())
}
