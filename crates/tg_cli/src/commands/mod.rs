//! CLI command definitions.
//!
//! Each subcommand synthesizes the topology from the global parameters and
//! then acts on the manifest: write it, print its plan, or hand it to the
//! provisioning engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use tg_core::SynthConfig;
use tg_synth::{Synthesis, TopologyOrchestrator};

pub mod deploy;
pub mod destroy;
pub mod plan;
pub mod synth;

/// Default location of the local engine state.
pub const DEFAULT_STATE_FILE: &str = ".tiergraph/state.json";

/// tiergraph - three-tier infrastructure topology synthesizer
#[derive(Parser)]
#[command(name = "tiergraph")]
#[command(version, about = "tiergraph - three-tier infrastructure topology synthesizer")]
#[command(long_about = r#"
tiergraph deterministically builds the resource graph of a three-tier web
application (network, security, data, compute, monitoring, edge), validates
it and hands it to a provisioning engine.

COMMANDS:
  synth    → Synthesize and validate the manifest
  plan     → Print the build order grouped by phase
  deploy   → Materialize the manifest with the local engine
  destroy  → Tear the stack down, keeping retained resources

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
  3 - Topology or validation failure
  4 - Materialization failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Parameters shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Environment suffix (dev, staging, prod); blank means dev
    #[arg(short, long = "env", env = "TIERGRAPH_ENV", global = true)]
    pub environment: Option<String>,

    /// Target account identifier (12 digits)
    #[arg(long, env = "TIERGRAPH_ACCOUNT", global = true)]
    pub account: Option<String>,

    /// Target region identifier
    #[arg(long, env = "TIERGRAPH_REGION", global = true)]
    pub region: Option<String>,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Load configuration, apply overrides and synthesize the manifest.
    pub fn synthesize(&self) -> Result<Synthesis> {
        let config = SynthConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?
            .with_account(self.account.clone())
            .with_region(self.region.clone());

        TopologyOrchestrator::new(config)
            .synthesize(self.environment.as_deref())
            .context("Synthesis failed")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize and validate the manifest
    Synth(synth::SynthArgs),

    /// Print the build plan
    Plan(plan::PlanArgs),

    /// Materialize the manifest
    Deploy(deploy::DeployArgs),

    /// Tear the stack down
    Destroy(destroy::DestroyArgs),
}
