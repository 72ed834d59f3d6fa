//! # tg_engine
//!
//! The provisioning boundary of tiergraph.
//!
//! Synthesis hands a validated, ordered [`Manifest`](tg_synth::Manifest) to a
//! [`ProvisioningEngine`], which creates or updates each resource in build
//! order, resolves the declared outputs and later tears the stack down.
//!
//! # Features
//!
//! - **Idempotent materialization**: an unchanged manifest is a no-op
//! - **Resumable runs**: a failed run keeps its progress and can be retried
//! - **Removal policies**: retained resources survive teardown and are reported
//! - **Local engine**: JSON state file or in-memory table, with failure injection
//!
//! # Example
//!
//! ```rust,no_run
//! use tg_core::SynthConfig;
//! use tg_engine::{LocalEngine, ProvisioningEngine};
//! use tg_synth::TopologyOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let synthesis = TopologyOrchestrator::new(SynthConfig::default()).synthesize(Some("dev"))?;
//!
//!     let engine = LocalEngine::open(".tiergraph/state.json").await?;
//!     let report = engine.materialize(&synthesis.manifest).await?;
//!     for output in &report.outputs {
//!         println!("{} = {}", output.name, output.value);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod local;

pub use engine::{
    MaterializationReport, ProvisioningEngine, ResourceAction, ResourceOutcome, TeardownReport,
};
pub use error::{EngineError, EngineResult};
pub use local::{EngineCall, EngineOperation, EngineState, LocalEngine, ResourceRecord};
