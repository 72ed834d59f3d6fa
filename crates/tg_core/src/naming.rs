//! Naming strategy.
//!
//! Every resource identifier in the manifest comes from [`name`]. The
//! function is total and deterministic: identical inputs always yield the
//! identical identifier, which is what makes re-synthesis idempotent.
//!
//! - every identifier starts with the project name
//! - globally-unique kinds (object stores) also carry account and region

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ProjectContext;

/// Logical identifier of a resource node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of resource in the fixed topology template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    NatGateway,
    DbSubnetGroup,
    SecurityGroup,
    SecurityGroupRule,
    Role,
    ObjectStore,
    BucketPolicy,
    KeyValueTable,
    Secret,
    Database,
    LaunchTemplate,
    AutoScalingGroup,
    LoadBalancer,
    TargetGroup,
    Listener,
    LogGroup,
    ConfigRecorder,
    DeliveryChannel,
    FirewallPolicy,
    Distribution,
}

impl ResourceKind {
    /// Short suffix appended to the identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "igw",
            ResourceKind::NatGateway => "nat",
            ResourceKind::DbSubnetGroup => "db-subnets",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::SecurityGroupRule => "sg-rule",
            ResourceKind::Role => "role",
            ResourceKind::ObjectStore => "bucket",
            ResourceKind::BucketPolicy => "bucket-policy",
            ResourceKind::KeyValueTable => "table",
            ResourceKind::Secret => "secret",
            ResourceKind::Database => "db",
            ResourceKind::LaunchTemplate => "lt",
            ResourceKind::AutoScalingGroup => "asg",
            ResourceKind::LoadBalancer => "alb",
            ResourceKind::TargetGroup => "tg",
            ResourceKind::Listener => "listener",
            ResourceKind::LogGroup => "logs",
            ResourceKind::ConfigRecorder => "recorder",
            ResourceKind::DeliveryChannel => "delivery",
            ResourceKind::FirewallPolicy => "waf",
            ResourceKind::Distribution => "cdn",
        }
    }

    /// Whether the provider requires the name to be unique across all accounts.
    pub fn is_globally_unique(&self) -> bool {
        matches!(self, ResourceKind::ObjectStore)
    }

    /// Provider limit on identifier length.
    pub fn max_name_len(&self) -> usize {
        match self {
            ResourceKind::LoadBalancer | ResourceKind::TargetGroup => 32,
            ResourceKind::ObjectStore => 63,
            ResourceKind::Role | ResourceKind::Database => 63,
            _ => 128,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.slug().to_string());
        write!(f, "{}", name)
    }
}

/// Derive the identifier of a resource.
///
/// `qualifier` distinguishes several resources of one kind (e.g. `compute`
/// for the compute security group, `public-1` for a subnet). It is folded to
/// a lowercase label first.
pub fn name(kind: ResourceKind, qualifier: Option<&str>, ctx: &ProjectContext) -> ResourceId {
    let mut parts = vec![ctx.project_name().to_string()];
    if let Some(label) = qualifier.map(normalize_label).filter(|l| !l.is_empty()) {
        parts.push(label);
    }

    if kind.is_globally_unique() {
        parts.push(ctx.account().to_string());
        parts.push(ctx.region().to_string());
    } else {
        parts.push(kind.slug().to_string());
    }

    ResourceId(parts.join("-"))
}

/// Convenience wrapper binding [`name`] to one context.
#[derive(Clone, Copy)]
pub struct NamingStrategy<'a> {
    context: &'a ProjectContext,
}

impl<'a> NamingStrategy<'a> {
    pub fn new(context: &'a ProjectContext) -> Self {
        Self { context }
    }

    pub fn name(&self, kind: ResourceKind) -> ResourceId {
        name(kind, None, self.context)
    }

    pub fn qualified(&self, kind: ResourceKind, qualifier: &str) -> ResourceId {
        name(kind, Some(qualifier), self.context)
    }

    pub fn context(&self) -> &'a ProjectContext {
        self.context
    }
}

fn normalize_label(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
