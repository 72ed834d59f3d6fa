//! # tg_network
//!
//! Network topology builder for tiergraph.
//!
//! Builds one VPC with three subnet tiers (public, private-with-egress,
//! isolated), one `/24` subnet per tier per availability zone, plus the
//! gateways and the database subnet group that hang off them.
//!
//! ```rust
//! use tg_core::{ContextResolver, SynthConfig};
//! use tg_network::{NetworkTopologyBuilder, SubnetTier};
//!
//! let ctx = ContextResolver::resolve(Some("dev"), &SynthConfig::default()).unwrap();
//! let topology = NetworkTopologyBuilder::new("10.0.0.0/16", 2).build(&ctx).unwrap();
//! assert_eq!(topology.tier(SubnetTier::Isolated).unwrap().subnets.len(), 2);
//! ```

pub mod cidr;
pub mod topology;

pub use cidr::Ipv4Cidr;
pub use topology::{
    DbSubnetGroup, DefaultRoute, NatGateway, NetworkTopology, NetworkTopologyBuilder, Subnet,
    SubnetTier, TierSubnets, VpcSpec, MIN_AZ_COUNT, SUBNET_MASK,
};
