//! Error types for the core module.
//!
//! Synthesis knows two error classes: [`ConfigurationError`] for bad input
//! parameters, raised before any graph construction, and [`TopologyError`]
//! for invariants violated while the graph is built or cross-validated.
//! Both are fatal to the run and neither is ever corrected silently.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::BuildPhase;
use crate::naming::ResourceId;

/// Result type alias for synthesis operations.
pub type SynthResult<T> = Result<T, SynthError>;

/// Result type alias for graph construction and validation.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Invalid or missing input parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown environment suffix '{value}' (allowed: {allowed})")]
    UnknownEnvironment { value: String, allowed: String },

    #[error("Invalid account identifier '{0}': expected exactly 12 digits")]
    InvalidAccount(String),

    #[error("Invalid region identifier '{0}'")]
    InvalidRegion(String),

    #[error("Invalid product name '{0}': expected a lowercase label of at most 16 characters")]
    InvalidProduct(String),

    #[error("Invalid setting {field}: {message}")]
    InvalidSetting { field: String, message: String },

    #[error("Unreadable configuration file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Internal invariant violated during graph construction or cross-validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Invalid CIDR block '{0}'")]
    InvalidCidr(String),

    #[error("CIDR blocks overlap: {first} and {second}")]
    OverlappingCidr { first: String, second: String },

    #[error("Insufficient address space in {cidr}: {requested} /{mask} subnets requested, {available} available")]
    InsufficientAddressSpace {
        cidr: String,
        mask: u8,
        requested: usize,
        available: usize,
    },

    #[error("Statement '{statement}' uses an unscoped wildcard for both actions and resources")]
    UnscopedWildcard { statement: String },

    #[error("Statement '{statement}' uses service-wide wildcard action '{action}'")]
    ServiceWildcardAction { statement: String, action: String },

    #[error("Statement '{statement}' has resource '{resource}' outside the {project} namespace")]
    UnscopedResource {
        statement: String,
        resource: String,
        project: String,
    },

    #[error("Statement '{statement}' is under-specified: {reason}")]
    UnderSpecifiedStatement { statement: String, reason: String },

    #[error("Edge distribution {0} has no firewall policy attached")]
    MissingFirewallAttachment(ResourceId),

    #[error("Invalid scaling bounds: min={min} desired={desired} max={max}")]
    InvalidScalingBounds { min: u32, desired: u32, max: u32 },

    #[error("Invalid health check on {target}: {reason}")]
    InvalidHealthCheck { target: ResourceId, reason: String },

    #[error("Database {0} uses a literal credential instead of a secret reference")]
    LiteralCredential(ResourceId),

    #[error("Credential reference {reference} on {database} does not resolve to a secret")]
    UnresolvedCredential {
        database: ResourceId,
        reference: ResourceId,
    },

    #[error("Secret {secret} cannot satisfy the database password rules: {reason}")]
    InvalidSecretTemplate { secret: ResourceId, reason: String },

    #[error("No isolated subnet tier available for {0}")]
    MissingIsolatedTier(ResourceId),

    #[error("Security group {group} allows ingress from {peer}: {reason}")]
    IngressViolation {
        group: ResourceId,
        peer: String,
        reason: String,
    },

    #[error("Security group {0} restricts egress but has no egress rule for its outbound traffic")]
    MissingEgressRule(ResourceId),

    #[error("Firewall rule priorities must be strictly increasing: {rule} has priority {priority} after {previous}")]
    NonMonotonicPriority {
        rule: String,
        priority: u32,
        previous: u32,
    },

    #[error("Edge distribution {0} does not upgrade viewers to secure transport")]
    InsecureViewerPolicy(ResourceId),

    #[error("{from} references unknown resource {to}")]
    DanglingReference { from: String, to: ResourceId },

    #[error("Dependency cycle detected between: {}", format_ids(.0))]
    DependencyCycle(Vec<ResourceId>),

    #[error("Resource name {0} is declared more than once")]
    DuplicateName(ResourceId),

    #[error("{node} ({node_phase}) depends on {dependency} from later phase {dependency_phase}")]
    PhaseInversion {
        node: ResourceId,
        node_phase: BuildPhase,
        dependency: ResourceId,
        dependency_phase: BuildPhase,
    },

    #[error("Invalid resource name {name}: {reason}")]
    InvalidName { name: String, reason: String },
}

fn format_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Any failure of a synthesis run.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SynthError {
    /// Whether this error is a configuration problem rather than a topology one.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SynthError::Configuration(_))
    }

    /// Whether this error is an invariant violation in the resource graph.
    pub fn is_topology(&self) -> bool {
        matches!(self, SynthError::Topology(_))
    }
}
