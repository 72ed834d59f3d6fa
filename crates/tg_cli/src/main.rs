//! tiergraph CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Topology or validation failure
//! - 4: Materialization failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tg_core::{ConfigurationError, SynthError};
use tg_engine::EngineError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIGURATION_ERROR: u8 = 2;
    pub const TOPOLOGY_ERROR: u8 = 3;
    pub const MATERIALIZATION_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "tiergraph=debug,tg_=debug,info"
    } else if cli.quiet {
        "warn"
    } else {
        "tiergraph=info,tg_=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    // A second initialization only happens under test harnesses.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match &cli.command {
        Commands::Synth(args) => commands::synth::execute(&cli.global, args).await,
        Commands::Plan(args) => commands::plan::execute(&cli.global, args).await,
        Commands::Deploy(args) => commands::deploy::execute(&cli.global, args).await,
        Commands::Destroy(args) => commands::destroy::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Map the first typed error in the chain to an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<SynthError>() {
            return match err {
                SynthError::Configuration(_) => ExitCodes::CONFIGURATION_ERROR,
                SynthError::Topology(_) => ExitCodes::TOPOLOGY_ERROR,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
        if cause.downcast_ref::<ConfigurationError>().is_some() {
            return ExitCodes::CONFIGURATION_ERROR;
        }
        if cause.downcast_ref::<EngineError>().is_some() {
            return ExitCodes::MATERIALIZATION_ERROR;
        }
    }
    ExitCodes::GENERAL_ERROR
}
