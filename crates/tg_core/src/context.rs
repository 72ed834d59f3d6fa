//! Project context resolution.
//!
//! The context is resolved once per synthesis run from the environment
//! suffix and the configuration, then passed by reference to every builder.
//! It has no public constructor other than [`ContextResolver::resolve`] and
//! no mutators.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RemovalPolicy, SynthConfig};
use crate::error::ConfigurationError;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    pub fn all() -> [Self; 3] {
        [Environment::Dev, Environment::Staging, Environment::Prod]
    }

    /// Comma-separated list of the allowed suffixes, for error messages.
    pub fn allowed() -> String {
        Self::all()
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }

    /// Removal policy applied to stateful resources unless overridden.
    pub fn default_removal_policy(&self) -> RemovalPolicy {
        if self.is_production() {
            RemovalPolicy::Retain
        } else {
            RemovalPolicy::Destroy
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownEnvironment {
                value: s.to_string(),
                allowed: Self::allowed(),
            })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable project context for one synthesis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectContext {
    environment: Environment,
    product: String,
    project_name: String,
    account: String,
    region: String,
}

impl ProjectContext {
    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// `<product>-<suffix>`, the prefix of every resource identifier.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Regional ARN for a resource owned by this account.
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, self.region, self.account, resource
        )
    }
}

/// Resolves raw environment parameters into a [`ProjectContext`].
pub struct ContextResolver;

impl ContextResolver {
    /// Resolve the context from an optional suffix and the configuration.
    ///
    /// An absent or blank suffix defaults to `dev`. Any other value outside
    /// {dev, staging, prod} is rejected with the allowed set in the message.
    pub fn resolve(
        suffix: Option<&str>,
        config: &SynthConfig,
    ) -> Result<ProjectContext, ConfigurationError> {
        let environment = match suffix.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => value.parse::<Environment>()?,
            None => Environment::default(),
        };

        if !product_matches(&config.product) {
            return Err(ConfigurationError::InvalidProduct(config.product.clone()));
        }
        if !account_matches(&config.account) {
            return Err(ConfigurationError::InvalidAccount(config.account.clone()));
        }
        if !region_matches(&config.region) {
            return Err(ConfigurationError::InvalidRegion(config.region.clone()));
        }

        let project_name = format!("{}-{}", config.product, environment.as_str());
        info!(
            "Resolved project context {} ({} / {})",
            project_name, config.account, config.region
        );

        Ok(ProjectContext {
            environment,
            product: config.product.clone(),
            project_name,
            account: config.account.clone(),
            region: config.region.clone(),
        })
    }
}

fn product_matches(value: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    pattern_matches(&PATTERN, r"^[a-z]([a-z0-9-]{0,14}[a-z0-9])?$", value)
}

fn account_matches(value: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    pattern_matches(&PATTERN, r"^\d{12}$", value)
}

fn region_matches(value: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    pattern_matches(&PATTERN, r"^[a-z]{2}(-[a-z]+)+-\d$", value)
}

/// Match against a lazily compiled pattern; one that fails to compile
/// matches nothing.
fn pattern_matches(cell: &OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_suffix_defaults_to_dev() {
        let ctx = ContextResolver::resolve(None, &SynthConfig::default()).unwrap();
        assert_eq!(ctx.environment(), Environment::Dev);
        assert_eq!(ctx.project_name(), "product-dev");

        let ctx = ContextResolver::resolve(Some("  "), &SynthConfig::default()).unwrap();
        assert_eq!(ctx.environment(), Environment::Dev);
    }

    #[test]
    fn test_project_name_per_environment() {
        for env in Environment::all() {
            let ctx = ContextResolver::resolve(Some(env.as_str()), &SynthConfig::default()).unwrap();
            assert_eq!(ctx.project_name(), format!("product-{}", env.as_str()));
        }
    }

    #[test]
    fn test_unknown_suffix_lists_allowed_set() {
        let err = ContextResolver::resolve(Some("qa"), &SynthConfig::default()).unwrap_err();
        match &err {
            ConfigurationError::UnknownEnvironment { value, allowed } => {
                assert_eq!(value, "qa");
                assert_eq!(allowed, "dev, staging, prod");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("dev, staging, prod"));
    }

    #[test]
    fn test_invalid_account_rejected() {
        let config = SynthConfig::default().with_account(Some("12345"));
        let err = ContextResolver::resolve(None, &config).unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidAccount("12345".to_string()));
    }

    #[test]
    fn test_invalid_region_rejected() {
        let config = SynthConfig::default().with_region(Some("mars"));
        assert!(matches!(
            ContextResolver::resolve(None, &config),
            Err(ConfigurationError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_invalid_product_rejected() {
        let config = SynthConfig {
            product: "Bad_Name".to_string(),
            ..SynthConfig::default()
        };
        assert!(matches!(
            ContextResolver::resolve(None, &config),
            Err(ConfigurationError::InvalidProduct(_))
        ));
    }

    #[test]
    fn test_uncompilable_pattern_matches_nothing() {
        let cell = OnceLock::new();
        assert!(!pattern_matches(&cell, r"^[a-z", "abc"));
        assert!(!pattern_matches(&cell, r"^[a-z", ""));
    }

    #[test]
    fn test_default_removal_policy() {
        assert_eq!(Environment::Dev.default_removal_policy(), RemovalPolicy::Destroy);
        assert_eq!(Environment::Staging.default_removal_policy(), RemovalPolicy::Destroy);
        assert_eq!(Environment::Prod.default_removal_policy(), RemovalPolicy::Retain);
    }
}
