//! Network topology builder.
//!
//! One VPC per run, spanning `az_count` availability zones. Each zone gets
//! one `/24` subnet per tier, allocated sequentially tier by tier:
//!
//! ```text
//! 10.0.0.0/24  public-1      10.0.2.0/24  private-1     10.0.4.0/24  isolated-1
//! 10.0.1.0/24  public-2      10.0.3.0/24  private-2     10.0.5.0/24  isolated-2
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tg_core::{
    BuildPhase, ConfigurationError, NamingStrategy, ProjectContext, ResourceId, ResourceKind,
    ResourceNode, SubGraph, SynthResult, TopologyError, TopologyResult,
};

use crate::cidr::Ipv4Cidr;

/// Mask used for every subnet.
pub const SUBNET_MASK: u8 = 24;

/// Minimum number of availability zones.
pub const MIN_AZ_COUNT: u8 = 2;

/// Zone letters available in a region.
const ZONE_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Logical network segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetTier {
    /// Internet-facing, routed through the internet gateway
    Public,
    /// Outbound-only, routed through a NAT gateway
    PrivateWithEgress,
    /// No route outside the VPC
    Isolated,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetTier::Public => "public",
            SubnetTier::PrivateWithEgress => "private",
            SubnetTier::Isolated => "isolated",
        }
    }

    /// Tiers in allocation order.
    pub fn all() -> [Self; 3] {
        [
            SubnetTier::Public,
            SubnetTier::PrivateWithEgress,
            SubnetTier::Isolated,
        ]
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a subnet's default route points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", content = "target", rename_all = "snake_case")]
pub enum DefaultRoute {
    InternetGateway(ResourceId),
    NatGateway(ResourceId),
    None,
}

/// The virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpcSpec {
    pub id: ResourceId,
    pub cidr: Ipv4Cidr,
    pub zones: Vec<String>,
    pub dns_hostnames: bool,
    pub dns_support: bool,
}

/// One subnet in one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    pub id: ResourceId,
    pub tier: SubnetTier,
    pub zone: String,
    pub cidr: Ipv4Cidr,
    pub map_public_ip: bool,
    pub route: DefaultRoute,
}

/// All subnets of one tier, one per zone in zone order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierSubnets {
    pub tier: SubnetTier,
    pub subnets: Vec<Subnet>,
}

impl TierSubnets {
    pub fn ids(&self) -> Vec<ResourceId> {
        self.subnets.iter().map(|s| s.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NatGateway {
    pub id: ResourceId,
    pub subnet: ResourceId,
    pub zone: String,
}

/// Subnet group the database is placed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbSubnetGroup {
    pub id: ResourceId,
    pub tier: SubnetTier,
    pub subnets: Vec<ResourceId>,
}

/// Output of the network builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkTopology {
    pub vpc: VpcSpec,
    pub tiers: Vec<TierSubnets>,
    pub internet_gateway: ResourceId,
    pub nat_gateways: Vec<NatGateway>,
    pub db_subnet_group: Option<DbSubnetGroup>,
}

impl NetworkTopology {
    pub fn tier(&self, tier: SubnetTier) -> Option<&TierSubnets> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn az_count(&self) -> usize {
        self.vpc.zones.len()
    }

    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.tiers.iter().flat_map(|t| t.subnets.iter())
    }

    /// Check the partition invariants: every subnet inside the VPC, no two
    /// subnets overlapping, every tier spanning every zone.
    pub fn validate(&self) -> TopologyResult<()> {
        let subnets: Vec<&Subnet> = self.subnets().collect();

        for subnet in &subnets {
            if !self.vpc.cidr.contains(&subnet.cidr) {
                return Err(TopologyError::OverlappingCidr {
                    first: subnet.cidr.to_string(),
                    second: format!("outside VPC {}", self.vpc.cidr),
                });
            }
        }

        for (i, a) in subnets.iter().enumerate() {
            for b in &subnets[i + 1..] {
                if a.cidr.overlaps(&b.cidr) {
                    return Err(TopologyError::OverlappingCidr {
                        first: format!("{} ({})", a.cidr, a.id),
                        second: format!("{} ({})", b.cidr, b.id),
                    });
                }
            }
        }

        for tier in &self.tiers {
            let zones: Vec<&str> = tier.subnets.iter().map(|s| s.zone.as_str()).collect();
            let expected: Vec<&str> = self.vpc.zones.iter().map(String::as_str).collect();
            if zones != expected {
                return Err(TopologyError::InsufficientAddressSpace {
                    cidr: self.vpc.cidr.to_string(),
                    mask: SUBNET_MASK,
                    requested: self.az_count(),
                    available: tier.subnets.len(),
                });
            }
        }

        Ok(())
    }
}

/// Builds the [`NetworkTopology`]. Pure given (context, az count, cidr).
#[derive(Debug, Clone)]
pub struct NetworkTopologyBuilder {
    cidr: String,
    az_count: u8,
}

impl NetworkTopologyBuilder {
    pub fn new(cidr: impl Into<String>, az_count: u8) -> Self {
        Self {
            cidr: cidr.into(),
            az_count,
        }
    }

    pub fn build(&self, ctx: &ProjectContext) -> SynthResult<NetworkTopology> {
        info!(
            "Building network topology for {} ({} across {} zones)",
            ctx.project_name(),
            self.cidr,
            self.az_count
        );

        if self.az_count < MIN_AZ_COUNT || usize::from(self.az_count) > ZONE_LETTERS.len() {
            return Err(ConfigurationError::InvalidSetting {
                field: "network.az_count".to_string(),
                message: format!(
                    "{} is outside {}..={}",
                    self.az_count,
                    MIN_AZ_COUNT,
                    ZONE_LETTERS.len()
                ),
            }
            .into());
        }

        let vpc_cidr: Ipv4Cidr = self.cidr.parse()?;
        let az_count = usize::from(self.az_count);
        let requested = az_count * SubnetTier::all().len();
        let available = vpc_cidr.subnet_capacity(SUBNET_MASK);
        if requested > available {
            return Err(TopologyError::InsufficientAddressSpace {
                cidr: vpc_cidr.to_string(),
                mask: SUBNET_MASK,
                requested,
                available,
            }
            .into());
        }

        let naming = NamingStrategy::new(ctx);
        let zones: Vec<String> = ZONE_LETTERS[..az_count]
            .iter()
            .map(|letter| format!("{}{}", ctx.region(), *letter as char))
            .collect();

        let internet_gateway = naming.name(ResourceKind::InternetGateway);

        // Non-production shares one NAT gateway; production gets one per zone.
        let nat_count = if ctx.environment().is_production() {
            az_count
        } else {
            1
        };

        let mut block = 0usize;
        let mut tiers = Vec::new();
        let mut nat_gateways = Vec::new();

        for tier in SubnetTier::all() {
            let mut subnets = Vec::with_capacity(az_count);
            for (zone_index, zone) in zones.iter().enumerate() {
                let cidr = vpc_cidr.subnet(SUBNET_MASK, block).ok_or_else(|| {
                    TopologyError::InsufficientAddressSpace {
                        cidr: vpc_cidr.to_string(),
                        mask: SUBNET_MASK,
                        requested,
                        available,
                    }
                })?;
                block += 1;

                let id = naming.qualified(
                    ResourceKind::Subnet,
                    &format!("{}-{}", tier.as_str(), zone_index + 1),
                );
                let route = match tier {
                    SubnetTier::Public => DefaultRoute::InternetGateway(internet_gateway.clone()),
                    SubnetTier::PrivateWithEgress => DefaultRoute::NatGateway(
                        naming.qualified(ResourceKind::NatGateway, &(zone_index % nat_count + 1).to_string()),
                    ),
                    SubnetTier::Isolated => DefaultRoute::None,
                };

                if tier == SubnetTier::Public && zone_index < nat_count {
                    nat_gateways.push(NatGateway {
                        id: naming.qualified(ResourceKind::NatGateway, &(zone_index + 1).to_string()),
                        subnet: id.clone(),
                        zone: zone.clone(),
                    });
                }

                debug!("Allocated {} {} in {}", id, cidr, zone);
                subnets.push(Subnet {
                    id,
                    tier,
                    zone: zone.clone(),
                    cidr,
                    map_public_ip: tier == SubnetTier::Public,
                    route,
                });
            }
            tiers.push(TierSubnets { tier, subnets });
        }

        let db_subnet_group = tiers
            .iter()
            .find(|t| t.tier == SubnetTier::Isolated)
            .map(|isolated| DbSubnetGroup {
                id: naming.name(ResourceKind::DbSubnetGroup),
                tier: SubnetTier::Isolated,
                subnets: isolated.ids(),
            });

        let topology = NetworkTopology {
            vpc: VpcSpec {
                id: naming.name(ResourceKind::Vpc),
                cidr: vpc_cidr,
                zones,
                dns_hostnames: true,
                dns_support: true,
            },
            tiers,
            internet_gateway,
            nat_gateways,
            db_subnet_group,
        };

        topology.validate()?;
        Ok(topology)
    }
}

impl SubGraph for NetworkTopology {
    fn name(&self) -> &'static str {
        "network"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Network;
        let vpc = &self.vpc.id;
        let mut nodes = vec![ResourceNode::new(vpc.clone(), ResourceKind::Vpc, phase, &self.vpc)?];

        nodes.push(
            ResourceNode::new(
                self.internet_gateway.clone(),
                ResourceKind::InternetGateway,
                phase,
                &field_map(&[("vpc", vpc.as_str())]),
            )?
            .depends_on([vpc]),
        );

        for tier in &self.tiers {
            for subnet in &tier.subnets {
                let mut node = ResourceNode::new(subnet.id.clone(), ResourceKind::Subnet, phase, subnet)?
                    .depends_on([vpc]);
                node = match &subnet.route {
                    DefaultRoute::InternetGateway(target) | DefaultRoute::NatGateway(target) => {
                        node.depends_on([target])
                    }
                    DefaultRoute::None => node,
                };
                nodes.push(node);
            }
        }

        for nat in &self.nat_gateways {
            nodes.push(
                ResourceNode::new(nat.id.clone(), ResourceKind::NatGateway, phase, nat)?
                    .depends_on([&nat.subnet, &self.internet_gateway]),
            );
        }

        if let Some(group) = &self.db_subnet_group {
            nodes.push(
                ResourceNode::new(group.id.clone(), ResourceKind::DbSubnetGroup, phase, group)?
                    .depends_on(&group.subnets),
            );
        }

        Ok(nodes)
    }
}

fn field_map(fields: &[(&str, &str)]) -> std::collections::BTreeMap<String, String> {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
