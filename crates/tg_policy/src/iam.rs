//! IAM roles and policy statements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use tg_core::{ProjectContext, ResourceId, TopologyError, TopologyResult};

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement or trust policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    /// A provider service, e.g. `ec2.amazonaws.com`
    Service(String),
    /// Everyone; only meaningful on deny statements
    Any,
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(name.into())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Service(name) => write!(f, "service:{}", name),
            Principal::Any => write!(f, "*"),
        }
    }
}

/// Condition block: operator -> key -> values.
pub type Conditions = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// One permission statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: Conditions,
}

impl PolicyStatement {
    pub fn allow(sid: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            effect: Effect::Allow,
            principal: None,
            actions: Vec::new(),
            resources: Vec::new(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn deny(sid: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(sid)
        }
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.conditions
            .entry(operator.into())
            .or_default()
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// True when both axes are the bare `*` wildcard.
    pub fn is_fully_unscoped(&self) -> bool {
        self.actions.iter().any(|a| a == "*") && self.resources.iter().any(|r| r == "*")
    }

    /// Whether `values` is required for `key` under `operator`.
    pub fn has_condition(&self, operator: &str, key: &str, value: &str) -> bool {
        self.conditions
            .get(operator)
            .and_then(|keys| keys.get(key))
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    /// The hard floor: never `*` on both actions and resources.
    pub fn check_scope(&self) -> TopologyResult<()> {
        if self.is_fully_unscoped() {
            return Err(TopologyError::UnscopedWildcard {
                statement: self.sid.clone(),
            });
        }
        Ok(())
    }
}

/// A role with a trust principal and inline statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IamRole {
    pub id: ResourceId,
    pub description: String,
    /// Service allowed to assume the role
    pub trust: Principal,
    /// Provider-managed policies attached by ARN
    pub managed_policies: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

impl IamRole {
    pub fn new(id: ResourceId, trust: Principal, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            trust,
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policies.push(arn.into());
        self
    }

    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }
}

/// Name segment of an ARN, without its resource-type prefix.
///
/// S3 ARNs name the bucket (and key) directly after `:::`; other services
/// use `<type>:<name>` or `<type>/<name>`. Returns `None` for anything that
/// is not an ARN.
pub fn resource_name(arn: &str) -> Option<&str> {
    let mut parts = arn.splitn(6, ':');
    if parts.next() != Some("arn") {
        return None;
    }
    let _partition = parts.next()?;
    let service = parts.next()?;
    let _region = parts.next()?;
    let _account = parts.next()?;
    let resource = parts.next().filter(|r| !r.is_empty())?;

    if service == "s3" {
        return Some(resource);
    }
    Some(match resource.find([':', '/']) {
        Some(split) => &resource[split + 1..],
        None => resource,
    })
}

/// Whether `resource` names something inside the `<project>-` namespace.
pub fn in_project_namespace(resource: &str, project: &str) -> bool {
    resource_name(resource)
        .and_then(|name| name.strip_prefix(project))
        .is_some_and(|rest| rest.starts_with('-'))
}

/// Resource patterns scoped to the project namespace.
///
/// Every pattern ends in `<project>-*`, never a bare `*`.
pub struct ScopedArns<'a> {
    ctx: &'a ProjectContext,
}

impl<'a> ScopedArns<'a> {
    pub fn new(ctx: &'a ProjectContext) -> Self {
        Self { ctx }
    }

    fn prefix(&self) -> String {
        format!("{}-*", self.ctx.project_name())
    }

    pub fn secrets(&self) -> String {
        self.ctx.arn("secretsmanager", &format!("secret:{}", self.prefix()))
    }

    pub fn buckets(&self) -> String {
        format!("arn:aws:s3:::{}", self.prefix())
    }

    pub fn objects(&self) -> String {
        format!("arn:aws:s3:::{}/*", self.prefix())
    }

    pub fn tables(&self) -> String {
        self.ctx.arn("dynamodb", &format!("table/{}", self.prefix()))
    }

    pub fn log_groups(&self) -> String {
        self.ctx.arn("logs", &format!("log-group:{}", self.prefix()))
    }

    /// ARN of one specific bucket.
    pub fn bucket(&self, bucket: &ResourceId) -> String {
        format!("arn:aws:s3:::{}", bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::{ContextResolver, SynthConfig};

    #[test]
    fn test_statement_builder() {
        let stmt = PolicyStatement::allow("Read")
            .actions(["s3:GetObject"])
            .resources(["arn:aws:s3:::product-dev-*/*"])
            .condition("Bool", "aws:SecureTransport", ["true"]);

        assert_eq!(stmt.effect, Effect::Allow);
        assert!(stmt.has_condition("Bool", "aws:SecureTransport", "true"));
        assert!(!stmt.has_condition("Bool", "aws:SecureTransport", "false"));
        assert!(stmt.check_scope().is_ok());
    }

    #[test]
    fn test_fully_unscoped_rejected() {
        let stmt = PolicyStatement::allow("Admin").actions(["*"]).resources(["*"]);
        assert_eq!(
            stmt.check_scope(),
            Err(TopologyError::UnscopedWildcard {
                statement: "Admin".to_string()
            })
        );
    }

    #[test]
    fn test_resource_name_segments() {
        assert_eq!(resource_name("arn:aws:s3:::product-dev-*/*"), Some("product-dev-*/*"));
        assert_eq!(
            resource_name("arn:aws:dynamodb:us-east-1:000000000000:table/product-dev-*"),
            Some("product-dev-*")
        );
        assert_eq!(
            resource_name("arn:aws:logs:us-east-1:000000000000:log-group:product-dev-*"),
            Some("product-dev-*")
        );
        assert_eq!(resource_name("*"), None);
        assert_eq!(resource_name("arn:aws:s3:::"), None);
    }

    #[test]
    fn test_namespace_requires_prefix() {
        assert!(in_project_namespace("arn:aws:s3:::product-dev-assets/*", "product-dev"));
        assert!(!in_project_namespace("arn:aws:s3:::evil-product-dev-bucket/*", "product-dev"));
        assert!(!in_project_namespace("arn:aws:s3:::*product-dev*", "product-dev"));
        assert!(!in_project_namespace("arn:aws:s3:::product-devops-*", "product-dev"));
        assert!(!in_project_namespace("*", "product-dev"));
    }

    #[test]
    fn test_scoped_arns() {
        let ctx = ContextResolver::resolve(Some("dev"), &SynthConfig::default()).unwrap();
        let arns = ScopedArns::new(&ctx);
        assert_eq!(
            arns.secrets(),
            "arn:aws:secretsmanager:us-east-1:000000000000:secret:product-dev-*"
        );
        assert_eq!(arns.objects(), "arn:aws:s3:::product-dev-*/*");
        assert_eq!(
            arns.tables(),
            "arn:aws:dynamodb:us-east-1:000000000000:table/product-dev-*"
        );
    }

    #[test]
    fn test_empty_conditions_not_serialized() {
        let stmt = PolicyStatement::allow("Logs")
            .actions(["logs:PutLogEvents"])
            .resources(["arn:aws:logs:us-east-1:000000000000:log-group:product-dev-*"]);
        let json = serde_json::to_value(&stmt).unwrap();
        assert!(json.get("conditions").is_none());
        assert!(json.get("principal").is_none());
    }
}
