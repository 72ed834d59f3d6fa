//! Resource-graph primitives shared by every builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RemovalPolicy;
use crate::context::ProjectContext;
use crate::error::SynthResult;
use crate::naming::{ResourceId, ResourceKind};

/// Provisioning phase of a node. Ordering of the variants is the build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Network,
    Security,
    Data,
    Compute,
    Monitoring,
    Edge,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Network => "network",
            BuildPhase::Security => "security",
            BuildPhase::Data => "data",
            BuildPhase::Compute => "compute",
            BuildPhase::Monitoring => "monitoring",
            BuildPhase::Edge => "edge",
        }
    }

    pub fn all() -> [Self; 6] {
        [
            BuildPhase::Network,
            BuildPhase::Security,
            BuildPhase::Data,
            BuildPhase::Compute,
            BuildPhase::Monitoring,
            BuildPhase::Edge,
        ]
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resource in the manifest graph.
///
/// `spec` holds the kind-specific specification as canonical JSON; with
/// `serde_json`'s default sorted maps its rendering is byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub phase: BuildPhase,
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub spec: serde_json::Value,
}

impl ResourceNode {
    /// Create a node from a typed specification.
    pub fn new<S: Serialize>(
        id: ResourceId,
        kind: ResourceKind,
        phase: BuildPhase,
        spec: &S,
    ) -> SynthResult<Self> {
        Ok(Self {
            id,
            kind,
            phase,
            depends_on: Vec::new(),
            removal_policy: RemovalPolicy::Destroy,
            tags: BTreeMap::new(),
            spec: serde_json::to_value(spec)?,
        })
    }

    /// Declare dependencies; duplicates are dropped, first occurrence wins.
    pub fn depends_on<'a>(mut self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        for id in ids {
            if !self.depends_on.contains(id) {
                self.depends_on.push(id.clone());
            }
        }
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Output of one builder: an immutable set of nodes.
pub trait SubGraph {
    /// Name used in logs and validation messages.
    fn name(&self) -> &'static str;

    /// Render the sub-graph as manifest nodes, in declaration order.
    fn nodes(&self) -> SynthResult<Vec<ResourceNode>>;
}

/// Tags applied to every node of a project.
pub fn common_tags(ctx: &ProjectContext) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Environment".to_string(), ctx.environment().to_string()),
        ("ManagedBy".to_string(), "tiergraph".to_string()),
        ("Project".to_string(), ctx.project_name().to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthConfig;
    use crate::context::ContextResolver;
    use crate::naming::NamingStrategy;

    #[test]
    fn test_phase_order() {
        let phases = BuildPhase::all();
        assert!(phases.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(phases[0], BuildPhase::Network);
        assert_eq!(phases[5], BuildPhase::Edge);
    }

    #[test]
    fn test_depends_on_dedupes() {
        let ctx = ContextResolver::resolve(None, &SynthConfig::default()).unwrap();
        let naming = NamingStrategy::new(&ctx);
        let vpc = naming.name(ResourceKind::Vpc);

        let node = ResourceNode::new(
            naming.name(ResourceKind::InternetGateway),
            ResourceKind::InternetGateway,
            BuildPhase::Network,
            &serde_json::json!({}),
        )
        .unwrap()
        .depends_on([&vpc, &vpc]);

        assert_eq!(node.depends_on, vec![vpc]);
    }

    #[test]
    fn test_common_tags() {
        let ctx = ContextResolver::resolve(Some("prod"), &SynthConfig::default()).unwrap();
        let tags = common_tags(&ctx);
        assert_eq!(tags.get("Project").map(String::as_str), Some("product-prod"));
        assert_eq!(tags.get("Environment").map(String::as_str), Some("prod"));
        assert_eq!(tags.get("ManagedBy").map(String::as_str), Some("tiergraph"));
    }
}
