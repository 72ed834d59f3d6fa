//! Monitoring and compliance specification.
//!
//! A configuration recorder with its own service role, delivering snapshots
//! into a dedicated object store. The delivery bucket policy is audited:
//! object writes by the delivery principal must force owner-full-control.

use serde::Serialize;
use tracing::info;

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, ResourceId, ResourceKind, ResourceNode, SubGraph,
    SynthConfig, SynthResult, TopologyResult,
};
use tg_policy::{
    IamRole, PolicyStatement, Principal, RuleSet, ScopedArns, ACL_CONDITION_KEY,
    ACL_CONDITION_OPERATOR, ACL_OWNER_FULL_CONTROL,
};

use crate::storage::{resolve_removal_policy, BucketPolicySpec, ObjectStoreSpec};

pub const CONFIG_SERVICE: &str = "config.amazonaws.com";
pub const CONFIG_MANAGED_POLICY: &str = "arn:aws:iam::aws:policy/service-role/AWS_ConfigRole";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderSpec {
    pub id: ResourceId,
    pub role: ResourceId,
    pub all_supported: bool,
    pub include_global_resource_types: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryChannelSpec {
    pub id: ResourceId,
    pub bucket: ResourceId,
    pub recorder: ResourceId,
    pub snapshot_frequency: String,
}

/// Monitoring sub-graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceSpec {
    pub role: IamRole,
    pub bucket: ObjectStoreSpec,
    pub bucket_policy: BucketPolicySpec,
    pub recorder: RecorderSpec,
    pub delivery: DeliveryChannelSpec,
}

impl ComplianceSpec {
    pub fn build(ctx: &ProjectContext, config: &SynthConfig) -> TopologyResult<Self> {
        info!("Building compliance recorder for {}", ctx.project_name());
        let naming = NamingStrategy::new(ctx);
        let arns = ScopedArns::new(ctx);

        let bucket = ObjectStoreSpec::new(
            naming.qualified(ResourceKind::ObjectStore, "config"),
            resolve_removal_policy(ctx, config),
        );
        let bucket_arn = arns.bucket(&bucket.id);
        let delivery_prefix = format!("{}/AWSLogs/{}/Config/*", bucket_arn, ctx.account());

        let role = IamRole::new(
            naming.qualified(ResourceKind::Role, "config"),
            Principal::service(CONFIG_SERVICE),
            "Service role for the configuration recorder",
        )
        .with_managed_policy(CONFIG_MANAGED_POLICY)
        .with_statement(
            PolicyStatement::allow("DeliverSnapshots")
                .actions(["s3:PutObject"])
                .resources([delivery_prefix.clone()]),
        )
        .with_statement(
            PolicyStatement::allow("ReadBucketAcl")
                .actions(["s3:GetBucketAcl"])
                .resources([bucket_arn.clone()]),
        );

        let mut statements = vec![
            PolicyStatement::allow("ConfigBucketPermissionsCheck")
                .principal(Principal::service(CONFIG_SERVICE))
                .actions(["s3:GetBucketAcl"])
                .resources([bucket_arn.clone()]),
            PolicyStatement::allow("ConfigBucketExistenceCheck")
                .principal(Principal::service(CONFIG_SERVICE))
                .actions(["s3:ListBucket"])
                .resources([bucket_arn]),
            PolicyStatement::allow("ConfigBucketDelivery")
                .principal(Principal::service(CONFIG_SERVICE))
                .actions(["s3:PutObject"])
                .resources([delivery_prefix])
                .condition(ACL_CONDITION_OPERATOR, ACL_CONDITION_KEY, [ACL_OWNER_FULL_CONTROL]),
        ];
        statements.extend(bucket.tls_statement(&arns));

        let recorder = RecorderSpec {
            id: naming.name(ResourceKind::ConfigRecorder),
            role: role.id.clone(),
            all_supported: true,
            include_global_resource_types: true,
        };

        let spec = Self {
            bucket_policy: BucketPolicySpec {
                id: naming.qualified(ResourceKind::BucketPolicy, "config"),
                bucket: bucket.id.clone(),
                statements,
            },
            delivery: DeliveryChannelSpec {
                id: naming.name(ResourceKind::DeliveryChannel),
                bucket: bucket.id.clone(),
                recorder: recorder.id.clone(),
                snapshot_frequency: "TwentyFour_Hours".to_string(),
            },
            role,
            bucket,
            recorder,
        };

        spec.validate(ctx)?;
        Ok(spec)
    }

    /// Audit the recorder role and the delivery bucket policy.
    pub fn validate(&self, ctx: &ProjectContext) -> TopologyResult<()> {
        let rules = RuleSet::least_privilege();
        for statement in self.role.statements.iter().chain(&self.bucket_policy.statements) {
            statement.check_scope()?;
        }
        rules.enforce(ctx.project_name(), &self.role.id, &self.role.statements)?;
        rules.enforce(
            ctx.project_name(),
            &self.bucket_policy.id,
            &self.bucket_policy.statements,
        )?;
        Ok(())
    }
}

impl SubGraph for ComplianceSpec {
    fn name(&self) -> &'static str {
        "monitoring"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Monitoring;

        Ok(vec![
            ResourceNode::new(self.role.id.clone(), ResourceKind::Role, phase, &self.role)?,
            self.bucket.node(phase)?,
            self.bucket_policy.node(phase)?,
            ResourceNode::new(
                self.recorder.id.clone(),
                ResourceKind::ConfigRecorder,
                phase,
                &self.recorder,
            )?
            .depends_on([&self.recorder.role]),
            ResourceNode::new(
                self.delivery.id.clone(),
                ResourceKind::DeliveryChannel,
                phase,
                &self.delivery,
            )?
            .depends_on([
                &self.delivery.bucket,
                &self.bucket_policy.id,
                &self.delivery.recorder,
            ]),
        ])
    }
}
