//! # tg_core
//!
//! Core types for tiergraph, the infrastructure topology synthesizer.
//!
//! This crate holds what every builder consumes:
//!
//! - **Context**: the immutable [`ProjectContext`], resolved once per run
//! - **Naming**: the single [`name`](naming::name) function all identifiers come from
//! - **Configuration**: [`SynthConfig`] with safe defaults, loaded from YAML
//! - **Graph**: [`ResourceNode`], [`BuildPhase`] and the [`SubGraph`] trait
//! - **Errors**: [`ConfigurationError`] and [`TopologyError`]
//!
//! # Example
//!
//! ```rust
//! use tg_core::{ContextResolver, NamingStrategy, ResourceKind, SynthConfig};
//!
//! let ctx = ContextResolver::resolve(Some("dev"), &SynthConfig::default()).unwrap();
//! assert_eq!(ctx.project_name(), "product-dev");
//!
//! let naming = NamingStrategy::new(&ctx);
//! assert_eq!(naming.name(ResourceKind::Vpc).as_str(), "product-dev-vpc");
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod naming;

pub use config::{
    ComputeSettings, NetworkSettings, RemovalPolicy, ScalingSettings, StorageSettings, SynthConfig,
};
pub use context::{ContextResolver, Environment, ProjectContext};
pub use error::{ConfigurationError, SynthError, SynthResult, TopologyError, TopologyResult};
pub use graph::{common_tags, BuildPhase, ResourceNode, SubGraph};
pub use naming::{name, NamingStrategy, ResourceId, ResourceKind};
