//! Local provisioning engine.
//!
//! Materializes manifests against an in-memory resource table, optionally
//! persisted to a JSON state file between runs. Physical ids and provider
//! attributes are synthesized, so a full deploy/destroy cycle can run
//! without any cloud account.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tg_core::{RemovalPolicy, ResourceId, ResourceKind, ResourceNode};
use tg_synth::{Manifest, OutputBinder};

use crate::engine::{
    MaterializationReport, ProvisioningEngine, ResourceAction, ResourceOutcome, TeardownReport,
};
use crate::error::{EngineError, EngineResult};

/// One resource known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub physical_id: String,
    /// Canonical rendering of everything that defines the resource
    pub digest: String,
    pub removal_policy: RemovalPolicy,
    /// Position in the build order of the last materialization
    pub order: usize,
    pub attributes: BTreeMap<String, String>,
    /// Left in place by a teardown; adopted again by the next materialization
    #[serde(default)]
    pub retained: bool,
}

/// Resources per project, live and retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub stacks: BTreeMap<String, BTreeMap<ResourceId, ResourceRecord>>,
}

impl EngineState {
    /// Live resources of `project`.
    pub fn resources(&self, project: &str) -> Vec<&ResourceId> {
        self.select(project, false)
    }

    /// Resources of `project` kept after a teardown.
    pub fn retained(&self, project: &str) -> Vec<&ResourceId> {
        self.select(project, true)
    }

    fn select(&self, project: &str, retained: bool) -> Vec<&ResourceId> {
        self.stacks
            .get(project)
            .map(|stack| {
                stack
                    .iter()
                    .filter(|(_, record)| record.retained == retained)
                    .map(|(id, _)| id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOperation {
    Materialize,
    Teardown,
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub operation: EngineOperation,
    pub project: String,
    pub at: DateTime<Utc>,
}

/// Engine backed by a local resource table.
#[derive(Clone)]
pub struct LocalEngine {
    state: Arc<RwLock<EngineState>>,
    /// Where state is persisted after every run, if anywhere.
    state_file: Option<PathBuf>,
    calls: Arc<RwLock<Vec<EngineCall>>>,
    /// Whole-run failure to return.
    simulate_failure: Arc<RwLock<Option<String>>>,
    /// Resource whose creation or deletion fails.
    fail_on: Arc<RwLock<Option<ResourceId>>>,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalEngine {
    /// Engine whose state lives only as long as the value.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState::default())),
            state_file: None,
            calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
            fail_on: Arc::new(RwLock::new(None)),
        }
    }

    /// Engine persisted to `path`. A missing file starts from empty state.
    pub async fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| EngineError::State {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => EngineState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened engine state {:?}", path);

        let mut engine = Self::in_memory();
        *engine.state.write() = state;
        engine.state_file = Some(path);
        Ok(engine)
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Fail every run with `message` before touching any resource.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Fail when the run reaches `resource`.
    pub fn fail_on(self, resource: &ResourceId) -> Self {
        *self.fail_on.write() = Some(resource.clone());
        self
    }

    pub fn clear_failures(&self) {
        *self.simulate_failure.write() = None;
        *self.fail_on.write() = None;
    }

    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    fn record_call(&self, operation: EngineOperation, project: &str) {
        self.calls.write().push(EngineCall {
            operation,
            project: project.to_string(),
            at: Utc::now(),
        });
    }

    fn check_failure(&self, project: &str) -> EngineResult<()> {
        if let Some(reason) = self.simulate_failure.read().clone() {
            return Err(EngineError::MaterializationFailed {
                project: project.to_string(),
                reason,
            });
        }
        Ok(())
    }

    fn check_resource(&self, resource: &ResourceId) -> EngineResult<()> {
        if self.fail_on.read().as_ref() == Some(resource) {
            return Err(EngineError::ResourceFailed {
                resource: resource.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn persist(&self) -> EngineResult<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let mut content = serde_json::to_string_pretty(&*self.state.read())?;
        content.push('\n');

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        debug!("Persisted engine state to {:?}", path);
        Ok(())
    }

    /// Apply the manifest to the resource table. Progress made before a
    /// failure stays in the table, so a retry resumes where this one stopped.
    fn apply(&self, manifest: &Manifest) -> EngineResult<Vec<ResourceOutcome>> {
        let mut state = self.state.write();
        let stack = state.stacks.entry(manifest.project.clone()).or_default();
        let mut outcomes = Vec::with_capacity(manifest.nodes.len());

        for (order, node) in manifest.nodes.iter().enumerate() {
            self.check_resource(&node.id)?;
            let digest = digest(node)?;

            let (action, physical_id) = match stack.get_mut(&node.id) {
                Some(record) if !record.retained && record.digest == digest => {
                    record.order = order;
                    (ResourceAction::Unchanged, record.physical_id.clone())
                }
                Some(record) => {
                    if record.retained {
                        info!("Adopting retained {} ({})", node.id, record.physical_id);
                        record.retained = false;
                    }
                    record.digest = digest;
                    record.removal_policy = node.removal_policy;
                    record.order = order;
                    record.attributes = attributes(manifest, node, &record.physical_id);
                    (ResourceAction::Updated, record.physical_id.clone())
                }
                None => {
                    let physical_id = format!("{}-{}", node.kind.slug(), Uuid::new_v4().simple());
                    stack.insert(
                        node.id.clone(),
                        ResourceRecord {
                            kind: node.kind,
                            physical_id: physical_id.clone(),
                            digest,
                            removal_policy: node.removal_policy,
                            order,
                            attributes: attributes(manifest, node, &physical_id),
                            retained: false,
                        },
                    );
                    (ResourceAction::Created, physical_id)
                }
            };

            debug!("{} {} ({})", action, node.id, node.kind);
            outcomes.push(ResourceOutcome {
                id: node.id.clone(),
                kind: node.kind,
                action,
                physical_id,
            });
        }

        // Resources dropped from the manifest go away, latest-built first.
        let orphans = live_in_reverse(stack, |id| manifest.node(id).is_none());
        for id in orphans {
            self.check_resource(&id)?;
            outcomes.extend(release(stack, id));
        }

        Ok(outcomes)
    }

    fn remove_all(&self, project: &str) -> EngineResult<Vec<ResourceOutcome>> {
        let mut state = self.state.write();
        let Some(stack) = state.stacks.get_mut(project) else {
            return Ok(Vec::new());
        };

        let ids = live_in_reverse(stack, |_| true);
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            self.check_resource(&id)?;
            outcomes.extend(release(stack, id));
        }
        if stack.is_empty() {
            state.stacks.remove(project);
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl ProvisioningEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn materialize(&self, manifest: &Manifest) -> EngineResult<MaterializationReport> {
        let started_at = Utc::now();
        self.record_call(EngineOperation::Materialize, &manifest.project);
        self.check_failure(&manifest.project)?;
        info!(
            "Materializing {} ({} resources)",
            manifest.project,
            manifest.nodes.len()
        );

        let applied = self.apply(manifest);
        self.persist().await?;
        let resources = applied?;

        let attributes = {
            let state = self.state.read();
            manifest
                .nodes
                .iter()
                .filter_map(|node| {
                    state
                        .stacks
                        .get(&manifest.project)
                        .and_then(|stack| stack.get(&node.id))
                        .map(|record| (node.id.clone(), record.attributes.clone()))
                })
                .collect()
        };

        let mut report = MaterializationReport {
            project: manifest.project.clone(),
            resources,
            attributes,
            outputs: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        };
        report.outputs = OutputBinder::resolve(&manifest.outputs, &report)?;

        info!(
            "Materialized {}: {} created, {} updated, {} unchanged, {} deleted",
            manifest.project,
            report.count(ResourceAction::Created),
            report.count(ResourceAction::Updated),
            report.count(ResourceAction::Unchanged),
            report.count(ResourceAction::Deleted)
        );
        Ok(report)
    }

    async fn teardown(&self, manifest: &Manifest) -> EngineResult<TeardownReport> {
        let started_at = Utc::now();
        self.record_call(EngineOperation::Teardown, &manifest.project);
        self.check_failure(&manifest.project)?;
        info!("Tearing down {}", manifest.project);

        let removed = self.remove_all(&manifest.project);
        self.persist().await?;
        let resources = removed?;

        let report = TeardownReport {
            project: manifest.project.clone(),
            resources,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "Tore down {}: {} deleted, {} retained",
            manifest.project,
            report.deleted().count(),
            report.retained().count()
        );
        Ok(report)
    }
}

/// Live ids selected by `keep`, latest-built first.
fn live_in_reverse(
    stack: &BTreeMap<ResourceId, ResourceRecord>,
    keep: impl Fn(&ResourceId) -> bool,
) -> Vec<ResourceId> {
    let mut ids: Vec<(usize, ResourceId)> = stack
        .iter()
        .filter(|(id, record)| !record.retained && keep(id))
        .map(|(id, record)| (record.order, id.clone()))
        .collect();
    ids.sort_by(|a, b| b.cmp(a));
    ids.into_iter().map(|(_, id)| id).collect()
}

/// Delete a resource, or mark it retained so a later run can adopt it.
fn release(
    stack: &mut BTreeMap<ResourceId, ResourceRecord>,
    id: ResourceId,
) -> Option<ResourceOutcome> {
    let record = stack.get_mut(&id)?;
    let policy = record.removal_policy;
    let (action, kind, physical_id) = match policy {
        RemovalPolicy::Retain => {
            warn!("Retaining {} ({})", id, record.physical_id);
            record.retained = true;
            (ResourceAction::Retained, record.kind, record.physical_id.clone())
        }
        RemovalPolicy::Destroy => {
            debug!("Deleting {} ({})", id, record.physical_id);
            let record = stack.remove(&id)?;
            (ResourceAction::Deleted, record.kind, record.physical_id)
        }
    };
    Some(ResourceOutcome {
        id,
        kind,
        action,
        physical_id,
    })
}

fn digest(node: &ResourceNode) -> EngineResult<String> {
    Ok(serde_json::to_string(&(
        node.kind,
        &node.spec,
        &node.depends_on,
        &node.tags,
        node.removal_policy,
    ))?)
}

fn service(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Role => "iam",
        ResourceKind::ObjectStore | ResourceKind::BucketPolicy => "s3",
        ResourceKind::KeyValueTable => "dynamodb",
        ResourceKind::Secret => "secretsmanager",
        ResourceKind::Database | ResourceKind::DbSubnetGroup => "rds",
        ResourceKind::AutoScalingGroup => "autoscaling",
        ResourceKind::LoadBalancer | ResourceKind::TargetGroup | ResourceKind::Listener => {
            "elasticloadbalancing"
        }
        ResourceKind::LogGroup => "logs",
        ResourceKind::ConfigRecorder | ResourceKind::DeliveryChannel => "config",
        ResourceKind::FirewallPolicy => "wafv2",
        ResourceKind::Distribution => "cloudfront",
        _ => "ec2",
    }
}

/// Provider attributes derived from the physical id.
fn attributes(manifest: &Manifest, node: &ResourceNode, physical_id: &str) -> BTreeMap<String, String> {
    let token: String = physical_id
        .rsplit('-')
        .next()
        .unwrap_or(physical_id)
        .chars()
        .take(12)
        .collect();

    let mut attributes = BTreeMap::from([
        ("physical_id".to_string(), physical_id.to_string()),
        (
            "arn".to_string(),
            format!(
                "arn:aws:{}:{}:{}:{}",
                service(node.kind),
                manifest.region,
                manifest.account,
                node.id
            ),
        ),
    ]);

    match node.kind {
        ResourceKind::LoadBalancer => {
            attributes.insert(
                "dns_name".to_string(),
                format!("{}-{}.{}.elb.amazonaws.com", node.id, token, manifest.region),
            );
        }
        ResourceKind::Distribution => {
            attributes.insert("domain_name".to_string(), format!("{}.cloudfront.net", token));
        }
        ResourceKind::Database => {
            attributes.insert(
                "endpoint_address".to_string(),
                format!("{}.{}.{}.rds.amazonaws.com", node.id, token, manifest.region),
            );
            if let Some(port) = node.spec.get("port").and_then(|p| p.as_u64()) {
                attributes.insert("endpoint_port".to_string(), port.to_string());
            }
        }
        _ => {}
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::SynthConfig;
    use tg_synth::{TopologyOrchestrator, DATABASE_ENDPOINT, LOAD_BALANCER_DNS};

    fn manifest(env: &str) -> Manifest {
        TopologyOrchestrator::new(SynthConfig::default())
            .synthesize(Some(env))
            .unwrap()
            .manifest
    }

    #[tokio::test]
    async fn test_materialize_creates_everything() {
        let manifest = manifest("dev");
        let engine = LocalEngine::in_memory();

        let report = engine.materialize(&manifest).await.unwrap();
        assert_eq!(report.count(ResourceAction::Created), manifest.nodes.len());
        assert_eq!(report.outputs.len(), 3);
        assert!(report
            .output(LOAD_BALANCER_DNS)
            .unwrap()
            .ends_with(".us-east-1.elb.amazonaws.com"));
        assert!(report
            .output(DATABASE_ENDPOINT)
            .unwrap()
            .starts_with("product-dev-db."));
    }

    #[tokio::test]
    async fn test_unchanged_manifest_is_noop() {
        let manifest = manifest("dev");
        let engine = LocalEngine::in_memory();

        let first = engine.materialize(&manifest).await.unwrap();
        let second = engine.materialize(&manifest).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_node_is_updated_in_place() {
        let mut manifest = manifest("staging");
        let engine = LocalEngine::in_memory();
        let first = engine.materialize(&manifest).await.unwrap();

        manifest.nodes[0]
            .tags
            .insert("CostCenter".to_string(), "web".to_string());
        let second = engine.materialize(&manifest).await.unwrap();

        assert_eq!(second.count(ResourceAction::Updated), 1);
        assert_eq!(second.resources[0].action, ResourceAction::Updated);
        assert_eq!(second.resources[0].physical_id, first.resources[0].physical_id);
    }

    #[tokio::test]
    async fn test_teardown_retains_in_prod() {
        let manifest = manifest("prod");
        let engine = LocalEngine::in_memory();
        engine.materialize(&manifest).await.unwrap();

        let report = engine.teardown(&manifest).await.unwrap();
        let retained: Vec<_> = report.retained().collect();
        assert!(!retained.is_empty());
        assert!(retained.iter().all(|id| manifest
            .node(id)
            .map(|n| n.removal_policy == RemovalPolicy::Retain)
            .unwrap_or(false)));
        assert!(engine.state().resources(&manifest.project).is_empty());
        let state = engine.state();
        let mut kept = state.retained(&manifest.project);
        let mut expected = retained.clone();
        kept.sort();
        expected.sort();
        assert_eq!(kept, expected);
    }

    #[tokio::test]
    async fn test_redeploy_adopts_retained_resources() {
        let manifest = manifest("prod");
        let engine = LocalEngine::in_memory();
        let first = engine.materialize(&manifest).await.unwrap();
        let teardown = engine.teardown(&manifest).await.unwrap();
        let retained: Vec<ResourceId> = teardown.retained().cloned().collect();

        let second = engine.materialize(&manifest).await.unwrap();
        assert_eq!(second.count(ResourceAction::Updated), retained.len());
        assert_eq!(
            second.count(ResourceAction::Created),
            manifest.nodes.len() - retained.len()
        );
        for id in &retained {
            let before = first.resources.iter().find(|r| &r.id == id).unwrap();
            let after = second.resources.iter().find(|r| &r.id == id).unwrap();
            assert_eq!(before.physical_id, after.physical_id);
        }
        assert!(engine.state().retained(&manifest.project).is_empty());
        assert_eq!(
            engine.state().resources(&manifest.project).len(),
            manifest.nodes.len()
        );
    }

    #[tokio::test]
    async fn test_second_teardown_leaves_retained_alone() {
        let manifest = manifest("prod");
        let engine = LocalEngine::in_memory();
        engine.materialize(&manifest).await.unwrap();
        engine.teardown(&manifest).await.unwrap();

        let again = engine.teardown(&manifest).await.unwrap();
        assert!(again.resources.is_empty());
        assert!(!engine.state().retained(&manifest.project).is_empty());
    }

    #[tokio::test]
    async fn test_teardown_runs_in_reverse_build_order() {
        let manifest = manifest("dev");
        let engine = LocalEngine::in_memory();
        engine.materialize(&manifest).await.unwrap();

        let report = engine.teardown(&manifest).await.unwrap();
        let torn: Vec<&ResourceId> = report.resources.iter().map(|r| &r.id).collect();
        let built: Vec<&ResourceId> = manifest.build_order().rev().collect();
        assert_eq!(torn, built);
        assert_eq!(report.retained().count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let engine = LocalEngine::in_memory().simulate_failure("quota exceeded");
        let err = engine.materialize(&manifest("dev")).await.unwrap_err();
        assert!(matches!(err, EngineError::MaterializationFailed { .. }));
        assert_eq!(engine.calls()[0].operation, EngineOperation::Materialize);
    }

    #[tokio::test]
    async fn test_retry_after_resource_failure() {
        let manifest = manifest("dev");
        let failing = manifest.nodes[5].id.clone();
        let engine = LocalEngine::in_memory().fail_on(&failing);

        let err = engine.materialize(&manifest).await.unwrap_err();
        assert!(matches!(err, EngineError::ResourceFailed { ref resource, .. } if *resource == failing));
        assert_eq!(engine.state().resources(&manifest.project).len(), 5);

        engine.clear_failures();
        let report = engine.materialize(&manifest).await.unwrap();
        assert_eq!(report.count(ResourceAction::Unchanged), 5);
        assert_eq!(report.count(ResourceAction::Created), manifest.nodes.len() - 5);
    }
}
