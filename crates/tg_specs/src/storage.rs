//! Object store and key-value table specifications.
//!
//! Both are always encrypted at rest; object stores always block public
//! access. The removal policy follows the environment unless the
//! configuration overrides it.

use serde::Serialize;
use tracing::info;

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, RemovalPolicy, ResourceId, ResourceKind,
    ResourceNode, SubGraph, SynthConfig, SynthResult,
};
use tg_policy::{PolicyStatement, Principal, RuleSet, ScopedArns};

use crate::secret::SecretSpec;

/// Removal policy for stateful resources of this run.
pub fn resolve_removal_policy(ctx: &ProjectContext, config: &SynthConfig) -> RemovalPolicy {
    config
        .storage
        .removal_policy
        .unwrap_or_else(|| ctx.environment().default_removal_policy())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    ObjectStore,
    KeyValueTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectStoreSpec {
    pub id: ResourceId,
    pub kind: StorageKind,
    pub encrypted: bool,
    pub block_public_access: bool,
    pub versioned: bool,
    /// Deny every request not made over TLS
    pub enforce_tls: bool,
    pub removal_policy: RemovalPolicy,
    /// Empty the store before deleting it on teardown
    pub auto_delete_objects: bool,
}

impl ObjectStoreSpec {
    pub fn new(id: ResourceId, removal_policy: RemovalPolicy) -> Self {
        Self {
            id,
            kind: StorageKind::ObjectStore,
            encrypted: true,
            block_public_access: true,
            versioned: true,
            enforce_tls: true,
            removal_policy,
            auto_delete_objects: removal_policy == RemovalPolicy::Destroy,
        }
    }

    /// Statement denying plain-HTTP access, attached when `enforce_tls` is set.
    pub fn tls_statement(&self, arns: &ScopedArns<'_>) -> Option<PolicyStatement> {
        if !self.enforce_tls {
            return None;
        }
        let bucket = arns.bucket(&self.id);
        Some(
            PolicyStatement::deny("DenyInsecureTransport")
                .principal(Principal::Any)
                .actions(["s3:GetObject", "s3:PutObject", "s3:ListBucket"])
                .resources([bucket.clone(), format!("{}/*", bucket)])
                .condition("Bool", "aws:SecureTransport", ["false"]),
        )
    }

    pub fn node(&self, phase: BuildPhase) -> SynthResult<ResourceNode> {
        Ok(
            ResourceNode::new(self.id.clone(), ResourceKind::ObjectStore, phase, self)?
                .with_removal_policy(self.removal_policy),
        )
    }
}

/// Resource policy attached to one object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPolicySpec {
    pub id: ResourceId,
    pub bucket: ResourceId,
    pub statements: Vec<PolicyStatement>,
}

impl BucketPolicySpec {
    pub fn node(&self, phase: BuildPhase) -> SynthResult<ResourceNode> {
        Ok(
            ResourceNode::new(self.id.clone(), ResourceKind::BucketPolicy, phase, self)?
                .depends_on([&self.bucket]),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableKey {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl TableKey {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    OnDemand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValueTableSpec {
    pub id: ResourceId,
    pub kind: StorageKind,
    pub encrypted: bool,
    pub partition_key: TableKey,
    pub sort_key: Option<TableKey>,
    pub billing: BillingMode,
    pub point_in_time_recovery: bool,
    pub removal_policy: RemovalPolicy,
}

/// Storage sub-graph: asset store and its policy, session table and the
/// database secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageSpec {
    pub assets: ObjectStoreSpec,
    pub assets_policy: BucketPolicySpec,
    pub sessions: KeyValueTableSpec,
    pub database_secret: SecretSpec,
}

impl StorageSpec {
    pub fn build(ctx: &ProjectContext, config: &SynthConfig) -> SynthResult<Self> {
        let naming = NamingStrategy::new(ctx);
        let removal_policy = resolve_removal_policy(ctx, config);
        info!(
            "Building storage for {} (removal policy: {})",
            ctx.project_name(),
            removal_policy.as_str()
        );

        let database_secret = SecretSpec::database_credentials(naming.qualified(ResourceKind::Secret, "db"));
        database_secret.validate()?;

        let assets = ObjectStoreSpec::new(naming.qualified(ResourceKind::ObjectStore, "assets"), removal_policy);
        let assets_policy = BucketPolicySpec {
            id: naming.qualified(ResourceKind::BucketPolicy, "assets"),
            bucket: assets.id.clone(),
            statements: assets.tls_statement(&ScopedArns::new(ctx)).into_iter().collect(),
        };
        for statement in &assets_policy.statements {
            statement.check_scope()?;
        }
        RuleSet::least_privilege().enforce(
            ctx.project_name(),
            &assets_policy.id,
            &assets_policy.statements,
        )?;

        Ok(Self {
            assets,
            assets_policy,
            sessions: KeyValueTableSpec {
                id: naming.qualified(ResourceKind::KeyValueTable, "sessions"),
                kind: StorageKind::KeyValueTable,
                encrypted: true,
                partition_key: TableKey::string("pk"),
                sort_key: Some(TableKey::string("sk")),
                billing: BillingMode::OnDemand,
                point_in_time_recovery: true,
                removal_policy,
            },
            database_secret,
        })
    }
}

impl SubGraph for StorageSpec {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Data;
        Ok(vec![
            self.assets.node(phase)?,
            self.assets_policy.node(phase)?,
            ResourceNode::new(self.sessions.id.clone(), ResourceKind::KeyValueTable, phase, &self.sessions)?
                .with_removal_policy(self.sessions.removal_policy),
            ResourceNode::new(
                self.database_secret.id.clone(),
                ResourceKind::Secret,
                phase,
                &self.database_secret,
            )?,
        ])
    }
}
