//! Relational database specification.
//!
//! The database is bound to the isolated subnet tier and the data security
//! group, and takes its credentials from the secret in the storage
//! sub-graph. All three bindings are checked at synthesis time.

use serde::Serialize;
use tracing::{debug, info};

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, RemovalPolicy, ResourceId, ResourceKind,
    ResourceNode, SubGraph, SynthConfig, SynthResult, TopologyError, TopologyResult,
};
use tg_network::{NetworkTopology, SubnetTier};
use tg_policy::{SecurityPolicyGraph, DATABASE_PORT};

use crate::secret::{Credential, SecretSpec};
use crate::storage::{resolve_removal_policy, StorageSpec};

pub const ENGINE: &str = "mysql";
pub const ENGINE_VERSION: &str = "8.0";
pub const INSTANCE_CLASS: &str = "db.t3.micro";
pub const ALLOCATED_STORAGE_GIB: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSpec {
    pub id: ResourceId,
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    pub port: u16,
    pub allocated_storage_gib: u32,
    pub subnet_group: ResourceId,
    pub subnet_tier: SubnetTier,
    pub security_group: ResourceId,
    pub credentials: Credential,
    pub storage_encrypted: bool,
    pub multi_az: bool,
    pub deletion_protection: bool,
    pub backup_retention_days: u32,
    pub removal_policy: RemovalPolicy,
}

impl DatabaseSpec {
    pub fn build(
        ctx: &ProjectContext,
        config: &SynthConfig,
        network: &NetworkTopology,
        security: &SecurityPolicyGraph,
        storage: &StorageSpec,
    ) -> TopologyResult<Self> {
        info!("Building database for {}", ctx.project_name());

        let id = NamingStrategy::new(ctx).name(ResourceKind::Database);
        let subnet_group = network
            .db_subnet_group
            .as_ref()
            .filter(|group| group.tier == SubnetTier::Isolated)
            .ok_or_else(|| TopologyError::MissingIsolatedTier(id.clone()))?;
        let production = ctx.environment().is_production();

        let spec = Self {
            id,
            engine: ENGINE.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            instance_class: INSTANCE_CLASS.to_string(),
            port: DATABASE_PORT,
            allocated_storage_gib: ALLOCATED_STORAGE_GIB,
            subnet_group: subnet_group.id.clone(),
            subnet_tier: subnet_group.tier,
            security_group: security.data.id.clone(),
            credentials: storage.database_secret.reference(),
            storage_encrypted: true,
            multi_az: production,
            deletion_protection: production,
            backup_retention_days: if production { 7 } else { 1 },
            removal_policy: resolve_removal_policy(ctx, config),
        };

        spec.validate(network, security, &storage.database_secret)?;
        Ok(spec)
    }

    /// Check the subnet, security-group and credential bindings.
    pub fn validate(
        &self,
        network: &NetworkTopology,
        security: &SecurityPolicyGraph,
        secret: &SecretSpec,
    ) -> TopologyResult<()> {
        let isolated = network
            .tier(SubnetTier::Isolated)
            .filter(|tier| !tier.subnets.is_empty());
        if self.subnet_tier != SubnetTier::Isolated || isolated.is_none() {
            return Err(TopologyError::MissingIsolatedTier(self.id.clone()));
        }

        if self.security_group != security.data.id {
            return Err(TopologyError::IngressViolation {
                group: self.security_group.clone(),
                peer: security.compute.id.to_string(),
                reason: format!("database must sit behind {}", security.data.id),
            });
        }
        security
            .data
            .check_ingress_only_from(&security.compute.id, self.port)?;

        match &self.credentials {
            Credential::Literal(_) => return Err(TopologyError::LiteralCredential(self.id.clone())),
            Credential::SecretRef(reference) if reference != &secret.id => {
                return Err(TopologyError::UnresolvedCredential {
                    database: self.id.clone(),
                    reference: reference.clone(),
                })
            }
            Credential::SecretRef(_) => {}
        }

        debug!("Database {} bindings verified", self.id);
        Ok(())
    }
}

impl SubGraph for DatabaseSpec {
    fn name(&self) -> &'static str {
        "database"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let mut node = ResourceNode::new(self.id.clone(), ResourceKind::Database, BuildPhase::Data, self)?
            .depends_on([&self.subnet_group, &self.security_group])
            .with_removal_policy(self.removal_policy);
        if let Credential::SecretRef(secret) = &self.credentials {
            node = node.depends_on([secret]);
        }
        Ok(vec![node])
    }
}
