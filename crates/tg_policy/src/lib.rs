//! # tg_policy
//!
//! Security policy graph for tiergraph.
//!
//! This crate provides:
//! - **Security Groups**: edge, compute and data groups joined by group-to-group
//!   rule edges over the fixed tier-flow list
//! - **IAM**: roles, trust principals and policy statements scoped to the
//!   project namespace
//! - **Audit Rules**: the least-privilege rule set every statement is checked
//!   against
//!
//! ## Example
//!
//! ```rust
//! use tg_core::{ContextResolver, SynthConfig};
//! use tg_network::NetworkTopologyBuilder;
//! use tg_policy::{SecurityPolicyGraph, HTTP_PORT};
//!
//! let ctx = ContextResolver::resolve(Some("dev"), &SynthConfig::default()).unwrap();
//! let network = NetworkTopologyBuilder::new("10.0.0.0/16", 2).build(&ctx).unwrap();
//! let graph = SecurityPolicyGraph::build(&ctx, &network).unwrap();
//!
//! graph.compute.check_ingress_only_from(&graph.edge.id, HTTP_PORT).unwrap();
//! ```

pub mod iam;
pub mod rules;
pub mod security;

pub use iam::{
    in_project_namespace, resource_name, Conditions, Effect, IamRole, PolicyStatement, Principal,
    ScopedArns,
};
pub use rules::{
    PolicyRule, RuleSet, RuleSeverity, RuleType, RuleViolation, ACL_CONDITION_KEY,
    ACL_CONDITION_OPERATOR, ACL_OWNER_FULL_CONTROL,
};
pub use security::{
    Direction, Peer, Protocol, SecurityGroup, SecurityPolicyGraph, SecurityRule, SecurityTier,
    DATABASE_PORT, HTTP_PORT, SSM_MANAGED_POLICY, TIER_FLOWS,
};
