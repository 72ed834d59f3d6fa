//! Security policy graph.
//!
//! Three security groups, one per logical tier, joined by directed rule
//! edges. Posture is deny-all: a flow exists only if both the receiving
//! ingress rule and, when the sender restricts egress, the matching egress
//! rule are present. Rules always reference the peer *group*, never the
//! peer's addresses, so the policy survives IP churn.
//!
//! The compute role lives here too; its statements follow the same rule of
//! never naming a resource outside the project namespace.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, ResourceId, ResourceKind, ResourceNode, SubGraph,
    SynthResult, TopologyError, TopologyResult,
};
use tg_network::{Ipv4Cidr, NetworkTopology};

use crate::iam::{IamRole, PolicyStatement, Principal, ScopedArns};
use crate::rules::RuleSet;

pub const HTTP_PORT: u16 = 80;
pub const DATABASE_PORT: u16 = 3306;

/// Allowed flows between tiers: (source, destination, port).
pub const TIER_FLOWS: [(SecurityTier, SecurityTier, u16); 2] = [
    (SecurityTier::Edge, SecurityTier::Compute, HTTP_PORT),
    (SecurityTier::Compute, SecurityTier::Data, DATABASE_PORT),
];

pub const SSM_MANAGED_POLICY: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";

/// Tier a security group guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    Edge,
    Compute,
    Data,
}

impl SecurityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityTier::Edge => "edge",
            SecurityTier::Compute => "compute",
            SecurityTier::Data => "data",
        }
    }
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The other end of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Peer {
    Cidr(Ipv4Cidr),
    Group(ResourceId),
}

impl Peer {
    /// The whole IPv4 address space.
    pub fn anywhere() -> Self {
        Peer::Cidr(Ipv4Cidr::ANYWHERE)
    }

    pub fn is_anywhere(&self) -> bool {
        matches!(self, Peer::Cidr(cidr) if cidr.prefix() == 0)
    }

    pub fn group(&self) -> Option<&ResourceId> {
        match self {
            Peer::Group(id) => Some(id),
            Peer::Cidr(_) => None,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Cidr(cidr) => write!(f, "{}", cidr),
            Peer::Group(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

/// One directed rule edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityRule {
    pub id: ResourceId,
    pub peer: Peer,
    pub protocol: Protocol,
    pub port: u16,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }
}

/// A security group and its rules, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroup {
    pub id: ResourceId,
    pub tier: SecurityTier,
    pub vpc: ResourceId,
    pub description: String,
    /// Provider default allow-all egress
    pub allow_all_outbound: bool,
    /// Whether anything behind the group initiates outbound traffic
    pub needs_outbound: bool,
    pub ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
}

impl SecurityGroup {
    fn new(
        id: ResourceId,
        tier: SecurityTier,
        vpc: ResourceId,
        allow_all_outbound: bool,
        needs_outbound: bool,
    ) -> Self {
        Self {
            id,
            tier,
            vpc,
            description: format!("{} tier", tier),
            allow_all_outbound,
            needs_outbound,
            ingress: Vec::new(),
            egress: Vec::new(),
        }
    }

    /// Ingress rules sourced from `group`.
    pub fn ingress_from<'a>(&'a self, group: &'a ResourceId) -> impl Iterator<Item = &'a SecurityRule> {
        self.ingress
            .iter()
            .filter(move |r| r.peer.group() == Some(group))
    }

    /// Fail unless every ingress rule comes from `peer` on `port`, and there
    /// is exactly one such rule.
    pub fn check_ingress_only_from(&self, peer: &ResourceId, port: u16) -> TopologyResult<()> {
        for rule in &self.ingress {
            if rule.peer.is_anywhere() {
                return Err(TopologyError::IngressViolation {
                    group: self.id.clone(),
                    peer: rule.peer.to_string(),
                    reason: "open to the whole address space".to_string(),
                });
            }
            if rule.peer.group() != Some(peer) || rule.port != port {
                return Err(TopologyError::IngressViolation {
                    group: self.id.clone(),
                    peer: rule.peer.to_string(),
                    reason: format!("only {} on port {} is allowed", peer, port),
                });
            }
        }

        if self.ingress.len() != 1 {
            return Err(TopologyError::IngressViolation {
                group: self.id.clone(),
                peer: peer.to_string(),
                reason: format!("expected exactly one ingress rule, found {}", self.ingress.len()),
            });
        }
        Ok(())
    }

    /// A group that opts out of default egress must carry an explicit egress
    /// rule when anything behind it talks outward.
    pub fn check_egress(&self) -> TopologyResult<()> {
        if !self.allow_all_outbound && self.needs_outbound && self.egress.is_empty() {
            return Err(TopologyError::MissingEgressRule(self.id.clone()));
        }
        Ok(())
    }
}

/// Output of the security builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityPolicyGraph {
    pub edge: SecurityGroup,
    pub compute: SecurityGroup,
    pub data: SecurityGroup,
    pub compute_role: IamRole,
}

impl SecurityPolicyGraph {
    /// Build the groups, rule edges and compute role for `network`.
    pub fn build(ctx: &ProjectContext, network: &NetworkTopology) -> TopologyResult<Self> {
        info!("Building security policy graph for {}", ctx.project_name());

        let naming = NamingStrategy::new(ctx);
        let vpc = network.vpc.id.clone();
        let group_id = |tier: SecurityTier| naming.qualified(ResourceKind::SecurityGroup, tier.as_str());

        let mut edge = SecurityGroup::new(
            group_id(SecurityTier::Edge),
            SecurityTier::Edge,
            vpc.clone(),
            false,
            true,
        );
        let mut compute = SecurityGroup::new(
            group_id(SecurityTier::Compute),
            SecurityTier::Compute,
            vpc.clone(),
            true,
            true,
        );
        let mut data = SecurityGroup::new(
            group_id(SecurityTier::Data),
            SecurityTier::Data,
            vpc,
            false,
            false,
        );

        let rule = |owner: SecurityTier,
                    direction: Direction,
                    peer: Peer,
                    peer_label: &str,
                    port: u16,
                    description: String| SecurityRule {
            id: naming.qualified(
                ResourceKind::SecurityGroupRule,
                &format!("{}-{}-{}-{}", owner, direction.as_str(), peer_label, port),
            ),
            peer,
            protocol: Protocol::Tcp,
            port,
            description,
        };

        edge.ingress.push(rule(
            SecurityTier::Edge,
            Direction::Ingress,
            Peer::anywhere(),
            "anywhere",
            HTTP_PORT,
            "HTTP from the internet".to_string(),
        ));

        for (source, destination, port) in TIER_FLOWS {
            let source_id = Self::pick(&edge, &compute, &data, source).id.clone();
            let destination_id = Self::pick(&edge, &compute, &data, destination).id.clone();

            Self::pick_mut(&mut edge, &mut compute, &mut data, destination)
                .ingress
                .push(rule(
                    destination,
                    Direction::Ingress,
                    Peer::Group(source_id.clone()),
                    source.as_str(),
                    port,
                    format!("{} from {} tier", port, source),
                ));

            let sender = Self::pick_mut(&mut edge, &mut compute, &mut data, source);
            if !sender.allow_all_outbound {
                sender.egress.push(rule(
                    source,
                    Direction::Egress,
                    Peer::Group(destination_id.clone()),
                    destination.as_str(),
                    port,
                    format!("{} to {} tier", port, destination),
                ));
            }
            debug!("Flow {} -> {} on {}", source_id, destination_id, port);
        }

        let compute_role = Self::compute_role(ctx, &naming);

        let graph = Self {
            edge,
            compute,
            data,
            compute_role,
        };
        graph.validate(ctx)?;
        Ok(graph)
    }

    fn compute_role(ctx: &ProjectContext, naming: &NamingStrategy<'_>) -> IamRole {
        let arns = ScopedArns::new(ctx);

        IamRole::new(
            naming.qualified(ResourceKind::Role, "compute"),
            Principal::service("ec2.amazonaws.com"),
            "Instance role for the compute fleet",
        )
        .with_managed_policy(SSM_MANAGED_POLICY)
        .with_statement(
            PolicyStatement::allow("ReadDatabaseSecret")
                .actions(["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"])
                .resources([arns.secrets()]),
        )
        .with_statement(
            PolicyStatement::allow("AssetObjects")
                .actions(["s3:GetObject", "s3:PutObject", "s3:DeleteObject"])
                .resources([arns.objects()]),
        )
        .with_statement(
            PolicyStatement::allow("AssetBucket")
                .actions(["s3:ListBucket"])
                .resources([arns.buckets()]),
        )
        .with_statement(
            PolicyStatement::allow("SessionTable")
                .actions([
                    "dynamodb:GetItem",
                    "dynamodb:PutItem",
                    "dynamodb:UpdateItem",
                    "dynamodb:DeleteItem",
                    "dynamodb:Query",
                ])
                .resources([arns.tables()]),
        )
        .with_statement(
            PolicyStatement::allow("ApplicationLogs")
                .actions(["logs:CreateLogStream", "logs:PutLogEvents"])
                .resources([arns.log_groups()]),
        )
    }

    fn pick<'a>(
        edge: &'a SecurityGroup,
        compute: &'a SecurityGroup,
        data: &'a SecurityGroup,
        tier: SecurityTier,
    ) -> &'a SecurityGroup {
        match tier {
            SecurityTier::Edge => edge,
            SecurityTier::Compute => compute,
            SecurityTier::Data => data,
        }
    }

    fn pick_mut<'a>(
        edge: &'a mut SecurityGroup,
        compute: &'a mut SecurityGroup,
        data: &'a mut SecurityGroup,
        tier: SecurityTier,
    ) -> &'a mut SecurityGroup {
        match tier {
            SecurityTier::Edge => edge,
            SecurityTier::Compute => compute,
            SecurityTier::Data => data,
        }
    }

    pub fn group(&self, tier: SecurityTier) -> &SecurityGroup {
        Self::pick(&self.edge, &self.compute, &self.data, tier)
    }

    pub fn groups(&self) -> [&SecurityGroup; 3] {
        [&self.edge, &self.compute, &self.data]
    }

    /// Check every flow invariant plus the least-privilege audit of the role.
    pub fn validate(&self, ctx: &ProjectContext) -> TopologyResult<()> {
        self.compute.check_ingress_only_from(&self.edge.id, HTTP_PORT)?;
        self.data.check_ingress_only_from(&self.compute.id, DATABASE_PORT)?;

        for group in self.groups() {
            group.check_egress()?;
        }

        for statement in &self.compute_role.statements {
            statement.check_scope()?;
        }
        RuleSet::least_privilege().enforce(
            ctx.project_name(),
            &self.compute_role.id,
            &self.compute_role.statements,
        )?;

        Ok(())
    }
}

fn rule_node(group: &SecurityGroup, direction: Direction, rule: &SecurityRule) -> SynthResult<ResourceNode> {
    let spec = RuleNodeSpec {
        group: &group.id,
        direction,
        peer: &rule.peer,
        protocol: rule.protocol,
        port: rule.port,
        description: &rule.description,
    };
    let node = ResourceNode::new(
        rule.id.clone(),
        ResourceKind::SecurityGroupRule,
        BuildPhase::Security,
        &spec,
    )?
    .depends_on([&group.id]);

    Ok(match rule.peer.group() {
        Some(peer) => node.depends_on([peer]),
        None => node,
    })
}

#[derive(Serialize)]
struct RuleNodeSpec<'a> {
    group: &'a ResourceId,
    direction: Direction,
    peer: &'a Peer,
    protocol: Protocol,
    port: u16,
    description: &'a str,
}

impl SubGraph for SecurityPolicyGraph {
    fn name(&self) -> &'static str {
        "security"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Security;
        let mut nodes = Vec::new();

        for group in self.groups() {
            let spec = GroupNodeSpec {
                vpc: &group.vpc,
                tier: group.tier,
                description: &group.description,
                allow_all_outbound: group.allow_all_outbound,
            };
            nodes.push(
                ResourceNode::new(group.id.clone(), ResourceKind::SecurityGroup, phase, &spec)?
                    .depends_on([&group.vpc]),
            );
        }

        // Rule edges are separate nodes so a group never depends on its peer.
        for group in self.groups() {
            for rule in &group.ingress {
                nodes.push(rule_node(group, Direction::Ingress, rule)?);
            }
            for rule in &group.egress {
                nodes.push(rule_node(group, Direction::Egress, rule)?);
            }
        }

        nodes.push(ResourceNode::new(
            self.compute_role.id.clone(),
            ResourceKind::Role,
            phase,
            &self.compute_role,
        )?);

        Ok(nodes)
    }
}

#[derive(Serialize)]
struct GroupNodeSpec<'a> {
    vpc: &'a ResourceId,
    tier: SecurityTier,
    description: &'a str,
    allow_all_outbound: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::{ContextResolver, SynthConfig};
    use tg_network::NetworkTopologyBuilder;

    fn graph(env: &str) -> (ProjectContext, SecurityPolicyGraph) {
        let ctx = ContextResolver::resolve(Some(env), &SynthConfig::default()).unwrap();
        let network = NetworkTopologyBuilder::new("10.0.0.0/16", 2).build(&ctx).unwrap();
        let graph = SecurityPolicyGraph::build(&ctx, &network).unwrap();
        (ctx, graph)
    }

    #[test]
    fn test_compute_ingress_only_from_edge() {
        let (_, graph) = graph("dev");
        assert_eq!(graph.compute.ingress.len(), 1);
        let rule = &graph.compute.ingress[0];
        assert_eq!(rule.peer, Peer::Group(graph.edge.id.clone()));
        assert_eq!(rule.port, HTTP_PORT);
    }

    #[test]
    fn test_data_ingress_only_from_compute() {
        let (_, graph) = graph("dev");
        assert_eq!(graph.data.ingress.len(), 1);
        assert_eq!(graph.data.ingress_from(&graph.compute.id).count(), 1);
        assert_eq!(graph.data.ingress[0].port, DATABASE_PORT);
    }

    #[test]
    fn test_no_open_ingress_behind_edge() {
        let (_, graph) = graph("prod");
        for group in [&graph.compute, &graph.data] {
            assert!(group.ingress.iter().all(|r| !r.peer.is_anywhere()));
        }
        assert!(graph.edge.ingress.iter().any(|r| r.peer.is_anywhere()));
    }

    #[test]
    fn test_restricted_edge_gets_matching_egress() {
        let (_, graph) = graph("dev");
        assert!(!graph.edge.allow_all_outbound);
        assert_eq!(graph.edge.egress.len(), 1);
        assert_eq!(graph.edge.egress[0].peer, Peer::Group(graph.compute.id.clone()));

        // Compute keeps default egress, so no explicit compute -> data rule.
        assert!(graph.compute.allow_all_outbound);
        assert!(graph.compute.egress.is_empty());
    }

    #[test]
    fn test_missing_egress_detected() {
        let (ctx, mut graph) = graph("dev");
        graph.edge.egress.clear();
        assert_eq!(
            graph.validate(&ctx),
            Err(TopologyError::MissingEgressRule(graph.edge.id.clone()))
        );
    }

    #[test]
    fn test_open_compute_ingress_rejected() {
        let (ctx, mut graph) = graph("dev");
        let mut open = graph.compute.ingress[0].clone();
        open.peer = Peer::anywhere();
        graph.compute.ingress.push(open);

        assert!(matches!(
            graph.validate(&ctx),
            Err(TopologyError::IngressViolation { ref group, .. }) if group == &graph.compute.id
        ));
    }

    #[test]
    fn test_data_ingress_from_edge_rejected() {
        let (ctx, mut graph) = graph("dev");
        graph.data.ingress[0].peer = Peer::Group(graph.edge.id.clone());
        assert!(matches!(
            graph.validate(&ctx),
            Err(TopologyError::IngressViolation { .. })
        ));
    }

    #[test]
    fn test_role_statements_scoped_to_project() {
        let (ctx, graph) = graph("staging");
        let role = &graph.compute_role;
        assert_eq!(role.trust, Principal::service("ec2.amazonaws.com"));
        assert!(role.managed_policies.contains(&SSM_MANAGED_POLICY.to_string()));
        for statement in &role.statements {
            assert!(!statement.is_fully_unscoped());
            assert!(statement.actions.iter().all(|a| !a.ends_with('*')));
            assert!(statement
                .resources
                .iter()
                .all(|r| r.contains(&format!("{}-*", ctx.project_name()))));
        }
    }

    #[test]
    fn test_wildcard_statement_fails_validation() {
        let (ctx, mut graph) = graph("dev");
        graph.compute_role.statements.push(
            PolicyStatement::allow("Everything").actions(["*"]).resources(["*"]),
        );
        assert!(matches!(
            graph.validate(&ctx),
            Err(TopologyError::UnscopedWildcard { .. })
        ));
    }

    #[test]
    fn test_rule_nodes_depend_on_both_groups() {
        let (_, graph) = graph("dev");
        let nodes = graph.nodes().unwrap();

        let groups: Vec<_> = nodes
            .iter()
            .filter(|n| n.kind == ResourceKind::SecurityGroup)
            .collect();
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.depends_on.len() == 1));

        let compute_ingress = nodes
            .iter()
            .find(|n| n.id == graph.compute.ingress[0].id)
            .unwrap();
        assert_eq!(compute_ingress.kind, ResourceKind::SecurityGroupRule);
        assert_eq!(
            compute_ingress.depends_on,
            vec![graph.compute.id.clone(), graph.edge.id.clone()]
        );
        assert!(nodes.iter().all(|n| n.phase == BuildPhase::Security));
    }

    #[test]
    fn test_rule_ids_are_distinct() {
        let (ctx, graph) = graph("dev");
        let mut ids: Vec<_> = graph
            .groups()
            .iter()
            .flat_map(|g| g.ingress.iter().chain(g.egress.iter()))
            .map(|r| r.id.clone())
            .collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert!(ids.iter().all(|id| id.as_str().starts_with(ctx.project_name())));
    }
}
