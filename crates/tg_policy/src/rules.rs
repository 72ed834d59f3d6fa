//! Least-privilege audit rules.
//!
//! Rules are evaluated over every policy statement in the graph, role
//! statements and resource (bucket) policies alike. `Error` violations fail
//! synthesis; `Warning` violations are logged and reported.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tg_core::{ResourceId, TopologyError, TopologyResult};

use crate::iam::{in_project_namespace, Effect, PolicyStatement, Principal};

/// Condition required on object writes by a delivery principal.
pub const ACL_CONDITION_OPERATOR: &str = "StringEquals";
pub const ACL_CONDITION_KEY: &str = "s3:x-amz-acl";
pub const ACL_OWNER_FULL_CONTROL: &str = "bucket-owner-full-control";

/// An audit rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: RuleSeverity,
    pub rule_type: RuleType,
    pub enabled: bool,
}

/// Rule severity levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Error,
    Warning,
    Info,
}

/// Types of rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// `*` on both actions and resources
    NoGlobalWildcard,
    /// `*` or `service:*` as an action
    NoServiceWildcard,
    /// Every resource pattern inside the project namespace
    ProjectScopedResources,
    /// Object writes by a service principal must force owner-full-control
    AclConditionOnDeliveryWrite,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            severity: RuleSeverity::Error,
            rule_type,
            enabled: true,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Result of rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub severity: RuleSeverity,
    pub message: String,
    /// Role or bucket policy owning the statement
    pub owner: ResourceId,
    pub statement: String,
    /// Offending action or resource, when there is one
    pub subject: Option<String>,
}

impl RuleViolation {
    /// Convert into the matching topology error.
    pub fn into_error(self, project: &str) -> TopologyError {
        match self.rule_type {
            RuleType::NoGlobalWildcard => TopologyError::UnscopedWildcard {
                statement: self.statement,
            },
            RuleType::NoServiceWildcard => TopologyError::ServiceWildcardAction {
                statement: self.statement,
                action: self.subject.unwrap_or_default(),
            },
            RuleType::ProjectScopedResources => TopologyError::UnscopedResource {
                statement: self.statement,
                resource: self.subject.unwrap_or_default(),
                project: project.to_string(),
            },
            RuleType::AclConditionOnDeliveryWrite => TopologyError::UnderSpecifiedStatement {
                statement: self.statement,
                reason: self.message,
            },
        }
    }
}

/// A set of audit rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// The least-privilege rule set applied to every synthesis.
    pub fn least_privilege() -> Self {
        let mut rules = Self::new("Least Privilege");

        rules.add(
            PolicyRule::new("no-global-wildcard", "No Global Wildcard", RuleType::NoGlobalWildcard)
                .with_description("A statement may not grant * on both actions and resources"),
        );

        rules.add(
            PolicyRule::new("no-service-wildcard", "No Service Wildcard", RuleType::NoServiceWildcard)
                .with_description("Actions must be listed explicitly, never service:*"),
        );

        rules.add(
            PolicyRule::new(
                "project-scoped-resources",
                "Project Scoped Resources",
                RuleType::ProjectScopedResources,
            )
            .with_description("Resource patterns must sit inside the project namespace"),
        );

        rules.add(
            PolicyRule::new(
                "acl-condition-on-delivery-write",
                "ACL Condition On Delivery Write",
                RuleType::AclConditionOnDeliveryWrite,
            )
            .with_description("Service principals writing objects must grant the bucket owner full control"),
        );

        rules
    }

    /// Add a rule to the set.
    pub fn add(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    /// Evaluate every enabled rule against the statements of one owner.
    pub fn evaluate(
        &self,
        project: &str,
        owner: &ResourceId,
        statements: &[PolicyStatement],
    ) -> Vec<RuleViolation> {
        let mut violations = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            for statement in statements {
                violations.extend(self.check(rule, project, owner, statement));
            }
        }

        debug!(
            "Audited {} statements of {}: {} violations",
            statements.len(),
            owner,
            violations.len()
        );
        violations
    }

    /// Evaluate and fail on the first `Error` violation; warnings are logged
    /// and returned.
    pub fn enforce(
        &self,
        project: &str,
        owner: &ResourceId,
        statements: &[PolicyStatement],
    ) -> TopologyResult<Vec<RuleViolation>> {
        let violations = self.evaluate(project, owner, statements);
        let (errors, rest): (Vec<_>, Vec<_>) = violations
            .into_iter()
            .partition(|v| v.severity == RuleSeverity::Error);

        if let Some(first) = errors.into_iter().next() {
            return Err(first.into_error(project));
        }

        for violation in rest.iter().filter(|v| v.severity == RuleSeverity::Warning) {
            warn!("{} ({} / {})", violation.message, violation.owner, violation.statement);
        }
        Ok(rest)
    }

    fn check(
        &self,
        rule: &PolicyRule,
        project: &str,
        owner: &ResourceId,
        statement: &PolicyStatement,
    ) -> Vec<RuleViolation> {
        let violation = |message: String, subject: Option<String>| RuleViolation {
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type,
            severity: rule.severity,
            message,
            owner: owner.clone(),
            statement: statement.sid.clone(),
            subject,
        };

        match rule.rule_type {
            RuleType::NoGlobalWildcard => {
                if statement.is_fully_unscoped() {
                    vec![violation(format!("{}: * on actions and resources", rule.name), None)]
                } else {
                    Vec::new()
                }
            }
            RuleType::NoServiceWildcard => statement
                .actions
                .iter()
                .filter(|a| a.as_str() == "*" || a.ends_with(":*"))
                .map(|a| violation(format!("{}: wildcard action {}", rule.name, a), Some(a.clone())))
                .collect(),
            RuleType::ProjectScopedResources => statement
                .resources
                .iter()
                .filter(|r| !in_project_namespace(r, project))
                .map(|r| {
                    violation(
                        format!("{}: resource {} outside {}", rule.name, r, project),
                        Some(r.clone()),
                    )
                })
                .collect(),
            RuleType::AclConditionOnDeliveryWrite => {
                let delivery_write = statement.effect == Effect::Allow
                    && matches!(statement.principal, Some(Principal::Service(_)))
                    && statement.actions.iter().any(|a| a == "s3:PutObject");
                let has_acl = statement.has_condition(
                    ACL_CONDITION_OPERATOR,
                    ACL_CONDITION_KEY,
                    ACL_OWNER_FULL_CONTROL,
                );
                if delivery_write && !has_acl {
                    vec![violation(
                        format!(
                            "object write without {} {} = {}",
                            ACL_CONDITION_OPERATOR, ACL_CONDITION_KEY, ACL_OWNER_FULL_CONTROL
                        ),
                        None,
                    )]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::{ContextResolver, NamingStrategy, ResourceKind, SynthConfig};

    fn owner() -> ResourceId {
        let ctx = ContextResolver::resolve(None, &SynthConfig::default()).unwrap();
        NamingStrategy::new(&ctx).qualified(ResourceKind::Role, "compute")
    }

    #[test]
    fn test_scoped_statement_passes() {
        let stmt = PolicyStatement::allow("Read")
            .actions(["s3:GetObject"])
            .resources(["arn:aws:s3:::product-dev-*/*"]);
        let violations = RuleSet::least_privilege().evaluate("product-dev", &owner(), &[stmt]);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_service_wildcard_flagged() {
        let stmt = PolicyStatement::allow("AllS3")
            .actions(["s3:*"])
            .resources(["arn:aws:s3:::product-dev-*"]);
        let err = RuleSet::least_privilege()
            .enforce("product-dev", &owner(), &[stmt])
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::ServiceWildcardAction {
                statement: "AllS3".to_string(),
                action: "s3:*".to_string()
            }
        );
    }

    #[test]
    fn test_bare_resource_flagged() {
        let stmt = PolicyStatement::allow("Describe")
            .actions(["ec2:DescribeInstances"])
            .resources(["*"]);
        let err = RuleSet::least_privilege()
            .enforce("product-dev", &owner(), &[stmt])
            .unwrap_err();
        assert!(matches!(err, TopologyError::UnscopedResource { .. }));
    }

    #[test]
    fn test_lookalike_resources_flagged() {
        let stmt = PolicyStatement::allow("Read")
            .actions(["s3:GetObject"])
            .resources(["arn:aws:s3:::evil-product-dev-bucket/*", "arn:aws:s3:::*product-dev*"]);
        let violations = RuleSet::least_privilege().evaluate("product-dev", &owner(), &[stmt]);
        let subjects: Vec<_> = violations.iter().filter_map(|v| v.subject.as_deref()).collect();
        assert_eq!(
            subjects,
            vec!["arn:aws:s3:::evil-product-dev-bucket/*", "arn:aws:s3:::*product-dev*"]
        );
    }

    #[test]
    fn test_global_wildcard_reported_first() {
        let stmt = PolicyStatement::allow("Admin").actions(["*"]).resources(["*"]);
        let err = RuleSet::least_privilege()
            .enforce("product-dev", &owner(), &[stmt])
            .unwrap_err();
        assert!(matches!(err, TopologyError::UnscopedWildcard { .. }));
    }

    #[test]
    fn test_delivery_write_needs_acl_condition() {
        let bare = PolicyStatement::allow("Delivery")
            .principal(Principal::service("config.amazonaws.com"))
            .actions(["s3:PutObject"])
            .resources(["arn:aws:s3:::product-dev-config/AWSLogs/*"]);
        let err = RuleSet::least_privilege()
            .enforce("product-dev", &owner(), &[bare.clone()])
            .unwrap_err();
        assert!(matches!(err, TopologyError::UnderSpecifiedStatement { .. }));

        let guarded = bare.condition(ACL_CONDITION_OPERATOR, ACL_CONDITION_KEY, [ACL_OWNER_FULL_CONTROL]);
        assert!(RuleSet::least_privilege()
            .enforce("product-dev", &owner(), &[guarded])
            .is_ok());
    }

    #[test]
    fn test_warning_severity_does_not_fail() {
        let mut rules = RuleSet::new("Lenient");
        rules.add(
            PolicyRule::new("svc", "Service Wildcard", RuleType::NoServiceWildcard)
                .with_severity(RuleSeverity::Warning),
        );
        let stmt = PolicyStatement::allow("Logs")
            .actions(["logs:*"])
            .resources(["arn:aws:logs:us-east-1:000000000000:log-group:product-dev-*"]);

        let warnings = rules.enforce("product-dev", &owner(), &[stmt]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule_id, "svc");
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let mut rules = RuleSet::new("Off");
        rules.add(PolicyRule::new("svc", "Service Wildcard", RuleType::NoServiceWildcard).disabled());
        let stmt = PolicyStatement::allow("All")
            .actions(["s3:*"])
            .resources(["arn:aws:s3:::product-dev-*"]);
        assert!(rules.evaluate("product-dev", &owner(), &[stmt]).is_empty());
    }
}
