//! # tg_specs
//!
//! Resource specifications for the data, compute, monitoring and edge
//! tiers of a tiergraph topology.
//!
//! Each builder is a pure function of the project context and the upstream
//! sub-graphs it binds to, and checks its own invariants before returning:
//!
//! - [`StorageSpec`]: asset object store and policy, session table, database secret
//! - [`DatabaseSpec`]: relational database in the isolated tier
//! - [`ComputeFleet`]: launch template, autoscaling group, load balancer
//! - [`ComplianceSpec`]: configuration recorder and its delivery bucket
//! - [`EdgeSpec`]: firewall policy and the edge distribution

pub mod compute;
pub mod database;
pub mod edge;
pub mod monitoring;
pub mod secret;
pub mod storage;

pub use compute::{
    AutoScalingSpec, ComputeFleet, HealthCheck, LaunchSpec, ListenerSpec, LoadBalancerSpec,
    LogGroupSpec, ScalingBounds, TargetGroupSpec,
};
pub use database::DatabaseSpec;
pub use edge::{
    EdgeDistribution, EdgeSpec, FirewallPolicy, FirewallRule, FirewallScope, ManagedRuleGroup,
    Origin, ViewerProtocolPolicy,
};
pub use monitoring::{ComplianceSpec, DeliveryChannelSpec, RecorderSpec};
pub use secret::{Credential, SecretSpec, SecretTemplate};
pub use storage::{
    resolve_removal_policy, BillingMode, BucketPolicySpec, KeyValueTableSpec, ObjectStoreSpec,
    StorageKind, StorageSpec, TableKey,
};
