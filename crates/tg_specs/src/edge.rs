//! Edge distribution and firewall specification.

use serde::Serialize;
use tracing::{debug, info};

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, ResourceId, ResourceKind, ResourceNode, SubGraph,
    SynthResult, TopologyError, TopologyResult,
};
use tg_policy::HTTP_PORT;

use crate::compute::ComputeFleet;

/// Managed rule groups, one per protection category, in priority order.
pub const MANAGED_RULE_GROUPS: [&str; 2] = [
    "AWSManagedRulesCommonRuleSet",
    "AWSManagedRulesKnownBadInputsRuleSet",
];

pub const MANAGED_RULE_VENDOR: &str = "AWS";

/// Managed cache policy that forwards every request to the load balancer.
pub const CACHE_POLICY: &str = "CachingDisabled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedRuleGroup {
    pub vendor: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallRule {
    pub name: String,
    pub priority: u32,
    pub rule_group: ManagedRuleGroup,
    pub metric_name: String,
    pub sampled_requests: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirewallScope {
    Cloudfront,
    Regional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallPolicy {
    pub id: ResourceId,
    pub scope: FirewallScope,
    pub default_allow: bool,
    pub metric_name: String,
    pub rules: Vec<FirewallRule>,
}

impl FirewallPolicy {
    /// Priorities start at 1 and strictly increase in declaration order.
    pub fn validate(&self) -> TopologyResult<()> {
        let mut previous = 0;
        for rule in &self.rules {
            if rule.priority <= previous {
                return Err(TopologyError::NonMonotonicPriority {
                    rule: rule.name.clone(),
                    priority: rule.priority,
                    previous,
                });
            }
            previous = rule.priority;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    RedirectToHttps,
    HttpsOnly,
    AllowAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub load_balancer: ResourceId,
    pub http_port: u16,
    /// The origin is reached over plain HTTP inside the provider network
    pub protocol_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDistribution {
    pub id: ResourceId,
    pub origin: Origin,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub cache_policy: String,
    pub firewall: Option<ResourceId>,
}

/// Edge sub-graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSpec {
    pub firewall: FirewallPolicy,
    pub distribution: EdgeDistribution,
}

impl EdgeSpec {
    pub fn build(ctx: &ProjectContext, compute: &ComputeFleet) -> TopologyResult<Self> {
        info!("Building edge distribution for {}", ctx.project_name());
        let naming = NamingStrategy::new(ctx);

        let rules = MANAGED_RULE_GROUPS
            .iter()
            .zip(1u32..)
            .map(|(group, priority)| FirewallRule {
                name: format!("{}-{}", MANAGED_RULE_VENDOR, group),
                priority,
                rule_group: ManagedRuleGroup {
                    vendor: MANAGED_RULE_VENDOR.to_string(),
                    name: group.to_string(),
                },
                metric_name: format!("{}-{}", ctx.project_name(), group),
                sampled_requests: true,
            })
            .collect();

        let firewall = FirewallPolicy {
            id: naming.name(ResourceKind::FirewallPolicy),
            scope: FirewallScope::Cloudfront,
            default_allow: true,
            metric_name: format!("{}-waf", ctx.project_name()),
            rules,
        };

        let distribution = EdgeDistribution {
            id: naming.name(ResourceKind::Distribution),
            origin: Origin {
                load_balancer: compute.load_balancer.id.clone(),
                http_port: HTTP_PORT,
                protocol_policy: "http-only".to_string(),
            },
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            cache_policy: CACHE_POLICY.to_string(),
            firewall: Some(firewall.id.clone()),
        };

        let spec = Self {
            firewall,
            distribution,
        };
        spec.validate(compute)?;
        Ok(spec)
    }

    pub fn validate(&self, compute: &ComputeFleet) -> TopologyResult<()> {
        self.firewall.validate()?;

        let distribution = &self.distribution;
        if distribution.firewall.as_ref() != Some(&self.firewall.id) {
            return Err(TopologyError::MissingFirewallAttachment(distribution.id.clone()));
        }
        if distribution.viewer_protocol_policy == ViewerProtocolPolicy::AllowAll {
            return Err(TopologyError::InsecureViewerPolicy(distribution.id.clone()));
        }
        if distribution.origin.load_balancer != compute.load_balancer.id {
            return Err(TopologyError::DanglingReference {
                from: distribution.id.to_string(),
                to: distribution.origin.load_balancer.clone(),
            });
        }

        debug!(
            "Distribution {} fronts {} with {} firewall rules",
            distribution.id,
            distribution.origin.load_balancer,
            self.firewall.rules.len()
        );
        Ok(())
    }
}

impl SubGraph for EdgeSpec {
    fn name(&self) -> &'static str {
        "edge"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Edge;
        let mut distribution = ResourceNode::new(
            self.distribution.id.clone(),
            ResourceKind::Distribution,
            phase,
            &self.distribution,
        )?
        .depends_on([&self.distribution.origin.load_balancer]);
        if let Some(firewall) = &self.distribution.firewall {
            distribution = distribution.depends_on([firewall]);
        }

        Ok(vec![
            ResourceNode::new(
                self.firewall.id.clone(),
                ResourceKind::FirewallPolicy,
                phase,
                &self.firewall,
            )?,
            distribution,
        ])
    }
}
