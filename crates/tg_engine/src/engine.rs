//! Provisioning engine trait and report types.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tg_core::{ResourceId, ResourceKind};
use tg_synth::{AttributeSource, Manifest, ResolvedOutput};

use crate::error::EngineResult;

/// What happened to one resource during an engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Retained,
}

impl ResourceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Created => "created",
            ResourceAction::Updated => "updated",
            ResourceAction::Unchanged => "unchanged",
            ResourceAction::Deleted => "deleted",
            ResourceAction::Retained => "retained",
        }
    }

    /// Whether the action touched the provider.
    pub fn is_change(&self) -> bool {
        !matches!(self, ResourceAction::Unchanged)
    }
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub action: ResourceAction,
    pub physical_id: String,
}

/// Result of materializing a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub project: String,
    /// Outcomes in build order; resources pruned from the manifest come last
    pub resources: Vec<ResourceOutcome>,
    /// Provider attributes of every live resource
    pub attributes: BTreeMap<ResourceId, BTreeMap<String, String>>,
    pub outputs: Vec<ResolvedOutput>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MaterializationReport {
    pub fn count(&self, action: ResourceAction) -> usize {
        self.resources.iter().filter(|r| r.action == action).count()
    }

    /// True when the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.resources.iter().all(|r| !r.action.is_change())
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value.as_str())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

impl AttributeSource for MaterializationReport {
    fn attributes_of(&self, resource: &ResourceId) -> Option<&BTreeMap<String, String>> {
        self.attributes.get(resource)
    }
}

/// Result of tearing down a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownReport {
    pub project: String,
    /// Outcomes in reverse build order
    pub resources: Vec<ResourceOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TeardownReport {
    pub fn deleted(&self) -> impl Iterator<Item = &ResourceId> {
        self.by_action(ResourceAction::Deleted)
    }

    pub fn retained(&self) -> impl Iterator<Item = &ResourceId> {
        self.by_action(ResourceAction::Retained)
    }

    fn by_action(&self, action: ResourceAction) -> impl Iterator<Item = &ResourceId> {
        self.resources
            .iter()
            .filter(move |r| r.action == action)
            .map(|r| &r.id)
    }
}

/// The boundary between synthesis and real resources.
///
/// Implementations must be idempotent per resource: materializing an
/// unchanged manifest again changes nothing, and a failed run can be retried
/// wholesale.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Create or update every resource in build order and resolve outputs.
    async fn materialize(&self, manifest: &Manifest) -> EngineResult<MaterializationReport>;

    /// Remove resources in reverse build order, honoring removal policies.
    async fn teardown(&self, manifest: &Manifest) -> EngineResult<TeardownReport>;
}
