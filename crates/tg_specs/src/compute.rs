//! Compute fleet specification.
//!
//! Launch template, autoscaling group in the private tier, an
//! internet-facing load balancer in the public tier, its target group and
//! listener, and the application log group.

use serde::Serialize;
use tracing::{debug, info};

use tg_core::{
    BuildPhase, NamingStrategy, ProjectContext, ResourceId, ResourceKind, ResourceNode,
    ScalingSettings, SubGraph, SynthConfig, SynthResult, TopologyError, TopologyResult,
};
use tg_network::{NetworkTopology, SubnetTier};
use tg_policy::{SecurityPolicyGraph, HTTP_PORT};

use crate::storage::StorageSpec;

pub const IMAGE: &str = "resolve:ssm:/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64";
pub const INSTANCE_TYPE: &str = "t3.micro";
pub const HEALTH_CHECK_GRACE_SECS: u32 = 300;

/// Autoscaling bounds. Valid when `min <= desired <= max` and `max > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScalingBounds {
    pub min: u32,
    pub desired: u32,
    pub max: u32,
}

impl ScalingBounds {
    pub fn for_context(ctx: &ProjectContext, config: &SynthConfig) -> Self {
        match config.compute.scaling {
            Some(ScalingSettings { min, desired, max }) => Self { min, desired, max },
            None if ctx.environment().is_production() => Self {
                min: 2,
                desired: 2,
                max: 6,
            },
            None => Self {
                min: 1,
                desired: 1,
                max: 3,
            },
        }
    }

    pub fn validate(&self) -> TopologyResult<()> {
        if self.min > self.desired || self.desired > self.max || self.max == 0 {
            return Err(TopologyError::InvalidScalingBounds {
                min: self.min,
                desired: self.desired,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub id: ResourceId,
    pub image: String,
    pub instance_type: String,
    pub security_group: ResourceId,
    pub role: ResourceId,
    pub user_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoScalingSpec {
    pub id: ResourceId,
    pub launch_template: ResourceId,
    pub subnets: Vec<ResourceId>,
    pub bounds: ScalingBounds,
    pub health_check_grace_secs: u32,
    pub target_group: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerSpec {
    pub id: ResourceId,
    pub internet_facing: bool,
    pub subnets: Vec<ResourceId>,
    pub subnet_tier: SubnetTier,
    pub security_group: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 30,
            timeout_secs: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroupSpec {
    pub id: ResourceId,
    pub vpc: ResourceId,
    pub port: u16,
    pub protocol: String,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerSpec {
    pub id: ResourceId,
    pub load_balancer: ResourceId,
    pub target_group: ResourceId,
    pub port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogGroupSpec {
    pub id: ResourceId,
    pub retention_days: u32,
}

/// Compute sub-graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputeFleet {
    pub launch: LaunchSpec,
    pub scaling: AutoScalingSpec,
    pub load_balancer: LoadBalancerSpec,
    pub target_group: TargetGroupSpec,
    pub listener: ListenerSpec,
    pub log_group: LogGroupSpec,
}

impl ComputeFleet {
    pub fn build(
        ctx: &ProjectContext,
        config: &SynthConfig,
        network: &NetworkTopology,
        security: &SecurityPolicyGraph,
        storage: &StorageSpec,
    ) -> TopologyResult<Self> {
        info!("Building compute fleet for {}", ctx.project_name());
        let naming = NamingStrategy::new(ctx);

        let subnets = |tier: SubnetTier| {
            network
                .tier(tier)
                .map(|t| t.ids())
                .unwrap_or_default()
        };

        let log_group = LogGroupSpec {
            id: naming.name(ResourceKind::LogGroup),
            retention_days: if ctx.environment().is_production() { 30 } else { 7 },
        };
        let target_group = TargetGroupSpec {
            id: naming.name(ResourceKind::TargetGroup),
            vpc: network.vpc.id.clone(),
            port: HTTP_PORT,
            protocol: "HTTP".to_string(),
            health_check: HealthCheck::default(),
        };
        let load_balancer = LoadBalancerSpec {
            id: naming.name(ResourceKind::LoadBalancer),
            internet_facing: true,
            subnets: subnets(SubnetTier::Public),
            subnet_tier: SubnetTier::Public,
            security_group: security.edge.id.clone(),
        };
        let launch = LaunchSpec {
            id: naming.name(ResourceKind::LaunchTemplate),
            image: IMAGE.to_string(),
            instance_type: INSTANCE_TYPE.to_string(),
            security_group: security.compute.id.clone(),
            role: security.compute_role.id.clone(),
            user_data: boot_script(ctx, storage, &log_group.id),
        };
        let fleet = Self {
            scaling: AutoScalingSpec {
                id: naming.name(ResourceKind::AutoScalingGroup),
                launch_template: launch.id.clone(),
                subnets: subnets(SubnetTier::PrivateWithEgress),
                bounds: ScalingBounds::for_context(ctx, config),
                health_check_grace_secs: HEALTH_CHECK_GRACE_SECS,
                target_group: target_group.id.clone(),
            },
            listener: ListenerSpec {
                id: naming.name(ResourceKind::Listener),
                load_balancer: load_balancer.id.clone(),
                target_group: target_group.id.clone(),
                port: HTTP_PORT,
                protocol: "HTTP".to_string(),
            },
            launch,
            load_balancer,
            target_group,
            log_group,
        };

        fleet.validate(security)?;
        Ok(fleet)
    }

    pub fn validate(&self, security: &SecurityPolicyGraph) -> TopologyResult<()> {
        self.scaling.bounds.validate()?;

        if self.scaling.health_check_grace_secs == 0 {
            return Err(TopologyError::InvalidHealthCheck {
                target: self.scaling.id.clone(),
                reason: "grace period must be positive".to_string(),
            });
        }

        let check = &self.target_group.health_check;
        let invalid = |reason: &str| TopologyError::InvalidHealthCheck {
            target: self.target_group.id.clone(),
            reason: reason.to_string(),
        };
        if check.path.is_empty() {
            return Err(invalid("path must not be empty"));
        }
        if !check.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        if check.timeout_secs == 0 || check.timeout_secs >= check.interval_secs {
            return Err(invalid("timeout must be positive and shorter than the interval"));
        }
        if check.healthy_threshold == 0 || check.unhealthy_threshold == 0 {
            return Err(invalid("thresholds must be positive"));
        }

        if self.launch.security_group != security.compute.id {
            return Err(TopologyError::IngressViolation {
                group: self.launch.security_group.clone(),
                peer: security.edge.id.to_string(),
                reason: format!("instances must sit behind {}", security.compute.id),
            });
        }
        security
            .compute
            .check_ingress_only_from(&security.edge.id, self.target_group.port)?;

        if self.load_balancer.security_group != security.edge.id
            || self.load_balancer.subnet_tier != SubnetTier::Public
        {
            return Err(TopologyError::IngressViolation {
                group: self.load_balancer.security_group.clone(),
                peer: self.load_balancer.id.to_string(),
                reason: "load balancer must sit in the public tier behind the edge group".to_string(),
            });
        }

        debug!(
            "Compute fleet bounds {}/{}/{}",
            self.scaling.bounds.min, self.scaling.bounds.desired, self.scaling.bounds.max
        );
        Ok(())
    }
}

/// Instance boot script. References resources by name only.
fn boot_script(ctx: &ProjectContext, storage: &StorageSpec, log_group: &ResourceId) -> String {
    [
        "#!/bin/bash".to_string(),
        "set -euo pipefail".to_string(),
        "dnf install -y amazon-cloudwatch-agent nginx".to_string(),
        "cat > /etc/app.env <<'EOF'".to_string(),
        format!("APP_ENV={}", ctx.environment()),
        format!("AWS_REGION={}", ctx.region()),
        format!("DB_SECRET_ID={}", storage.database_secret.id),
        format!("ASSET_BUCKET={}", storage.assets.id),
        format!("SESSION_TABLE={}", storage.sessions.id),
        format!("LOG_GROUP={}", log_group),
        "EOF".to_string(),
        "systemctl enable --now nginx".to_string(),
        String::new(),
    ]
    .join("\n")
}

impl SubGraph for ComputeFleet {
    fn name(&self) -> &'static str {
        "compute"
    }

    fn nodes(&self) -> SynthResult<Vec<ResourceNode>> {
        let phase = BuildPhase::Compute;

        Ok(vec![
            ResourceNode::new(self.log_group.id.clone(), ResourceKind::LogGroup, phase, &self.log_group)?,
            ResourceNode::new(self.launch.id.clone(), ResourceKind::LaunchTemplate, phase, &self.launch)?
                .depends_on([&self.launch.security_group, &self.launch.role]),
            ResourceNode::new(
                self.target_group.id.clone(),
                ResourceKind::TargetGroup,
                phase,
                &self.target_group,
            )?
            .depends_on([&self.target_group.vpc]),
            ResourceNode::new(
                self.load_balancer.id.clone(),
                ResourceKind::LoadBalancer,
                phase,
                &self.load_balancer,
            )?
            .depends_on(&self.load_balancer.subnets)
            .depends_on([&self.load_balancer.security_group]),
            ResourceNode::new(self.listener.id.clone(), ResourceKind::Listener, phase, &self.listener)?
                .depends_on([&self.listener.load_balancer, &self.listener.target_group]),
            ResourceNode::new(
                self.scaling.id.clone(),
                ResourceKind::AutoScalingGroup,
                phase,
                &self.scaling,
            )?
            .depends_on([&self.scaling.launch_template, &self.scaling.target_group])
            .depends_on(&self.scaling.subnets),
        ])
    }
}
