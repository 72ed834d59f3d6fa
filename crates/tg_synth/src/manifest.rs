//! The synthesized manifest.

use serde::{Deserialize, Serialize};

use tg_core::{BuildPhase, Environment, ResourceId, ResourceKind, ResourceNode, SynthResult};

use crate::outputs::OutputBinding;
use crate::plan::BuildPlan;

/// Composed, validated resource graph, with nodes in build order.
///
/// Holds no timestamps or generated ids: two syntheses from the same input
/// render byte-for-byte identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project: String,
    pub environment: Environment,
    pub account: String,
    pub region: String,
    pub nodes: Vec<ResourceNode>,
    pub outputs: Vec<OutputBinding>,
}

impl Manifest {
    pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Node ids in the order they must be materialized.
    pub fn build_order(&self) -> impl DoubleEndedIterator<Item = &ResourceId> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Nodes of one phase, in build order.
    pub fn phase(&self, phase: BuildPhase) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.phase == phase)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn plan(&self) -> BuildPlan {
        BuildPlan::from_manifest(self)
    }

    /// Canonical JSON rendering, used to compare manifests.
    pub fn fingerprint(&self) -> SynthResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
