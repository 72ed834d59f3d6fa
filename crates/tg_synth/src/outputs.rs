//! Output bindings.
//!
//! Outputs are declared at synthesis time as deferred references into
//! manifest nodes. Their values only exist once a provisioning engine has
//! materialized the manifest; [`OutputBinder::resolve`] fills them in from
//! whatever attribute source the engine exposes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tg_core::{ResourceId, ResourceNode, TopologyError, TopologyResult};
use tg_specs::{ComputeFleet, DatabaseSpec, EdgeSpec};

use crate::error::{OutputError, OutputResult};

pub const LOAD_BALANCER_DNS: &str = "LoadBalancerDns";
pub const DISTRIBUTION_DOMAIN: &str = "DistributionDomainName";
pub const DATABASE_ENDPOINT: &str = "DatabaseEndpoint";

/// A named, deferred reference to one attribute of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub name: String,
    pub source: ResourceId,
    pub attribute: String,
    pub description: String,
}

impl OutputBinding {
    pub fn new(
        name: impl Into<String>,
        source: &ResourceId,
        attribute: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.clone(),
            attribute: attribute.into(),
            description: description.into(),
        }
    }
}

/// An output with its materialized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOutput {
    pub name: String,
    pub value: String,
    pub description: String,
}

/// Attribute values produced by materialization.
pub trait AttributeSource {
    /// `None` when the resource is unknown.
    fn attributes_of(&self, resource: &ResourceId) -> Option<&BTreeMap<String, String>>;
}

pub struct OutputBinder;

impl OutputBinder {
    /// The three outputs of the topology template.
    pub fn declare(
        compute: &ComputeFleet,
        edge: &EdgeSpec,
        database: &DatabaseSpec,
    ) -> Vec<OutputBinding> {
        vec![
            OutputBinding::new(
                LOAD_BALANCER_DNS,
                &compute.load_balancer.id,
                "dns_name",
                "DNS name of the application load balancer",
            ),
            OutputBinding::new(
                DISTRIBUTION_DOMAIN,
                &edge.distribution.id,
                "domain_name",
                "Domain name of the edge distribution",
            ),
            OutputBinding::new(
                DATABASE_ENDPOINT,
                &database.id,
                "endpoint_address",
                "Hostname of the database endpoint",
            ),
        ]
    }

    /// Every binding must point at a node of the manifest, and names are unique.
    pub fn validate(bindings: &[OutputBinding], nodes: &[ResourceNode]) -> TopologyResult<()> {
        for (i, binding) in bindings.iter().enumerate() {
            if !nodes.iter().any(|n| n.id == binding.source) {
                return Err(TopologyError::DanglingReference {
                    from: format!("output {}", binding.name),
                    to: binding.source.clone(),
                });
            }
            if bindings[..i].iter().any(|b| b.name == binding.name) {
                return Err(TopologyError::InvalidName {
                    name: binding.name.clone(),
                    reason: "output declared more than once".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fill every binding from `source`, in declaration order.
    pub fn resolve<S: AttributeSource + ?Sized>(
        bindings: &[OutputBinding],
        source: &S,
    ) -> OutputResult<Vec<ResolvedOutput>> {
        bindings
            .iter()
            .map(|binding| {
                let attributes = source.attributes_of(&binding.source).ok_or_else(|| {
                    OutputError::MissingSource {
                        output: binding.name.clone(),
                        source_id: binding.source.clone(),
                    }
                })?;
                let value = attributes.get(&binding.attribute).ok_or_else(|| {
                    OutputError::MissingAttribute {
                        output: binding.name.clone(),
                        source_id: binding.source.clone(),
                        attribute: binding.attribute.clone(),
                    }
                })?;
                debug!("Resolved output {} = {}", binding.name, value);
                Ok(ResolvedOutput {
                    name: binding.name.clone(),
                    value: value.clone(),
                    description: binding.description.clone(),
                })
            })
            .collect()
    }
}
