//! # tg_synth
//!
//! Composes the sub-graphs of a three-tier web application into one
//! validated, deterministically ordered resource manifest.
//!
//! ## Pipeline
//!
//! 1. Resolve the project context from the environment suffix
//! 2. Build network, security, data, compute, monitoring and edge sub-graphs
//! 3. Tag every node, check names, references, phases and cycles
//! 4. Order nodes for materialization and bind the stack outputs
//!
//! ## Example
//!
//! ```rust,no_run
//! use tg_core::SynthConfig;
//! use tg_synth::{ManifestFormat, ManifestWriter, TopologyOrchestrator};
//!
//! let orchestrator = TopologyOrchestrator::new(SynthConfig::default());
//! let synthesis = orchestrator.synthesize(Some("staging")).unwrap();
//!
//! println!("{}", synthesis.manifest.plan());
//! ManifestWriter::write(
//!     &synthesis.manifest,
//!     "out/manifest.json".as_ref(),
//!     ManifestFormat::Json,
//! )
//! .unwrap();
//! ```

pub mod dag;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod outputs;
pub mod plan;
pub mod writer;

pub use error::{OutputError, OutputResult};
pub use manifest::Manifest;
pub use orchestrator::{compose, Synthesis, Topology, TopologyOrchestrator};
pub use outputs::{
    AttributeSource, OutputBinder, OutputBinding, ResolvedOutput, DATABASE_ENDPOINT,
    DISTRIBUTION_DOMAIN, LOAD_BALANCER_DNS,
};
pub use plan::{BuildPlan, PhaseStep, PlannedResource};
pub use writer::{ManifestFormat, ManifestWriter};
