//! Synthesis configuration.
//!
//! Every field has a default, so an absent configuration file synthesizes the
//! stock topology. Values the caller supplies from the process environment
//! (account, region) are merged in by the CLI before context resolution.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;

pub const DEFAULT_PRODUCT: &str = "product";
pub const DEFAULT_ACCOUNT: &str = "000000000000";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_AZ_COUNT: u8 = 2;

/// What happens to a stateful resource when the stack is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete the resource (object stores are emptied first).
    #[default]
    Destroy,
    /// Leave the resource in place, orphaned from the stack.
    Retain,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "destroy",
            RemovalPolicy::Retain => "retain",
        }
    }
}

/// Top-level synthesis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Product name, the first half of every project name
    pub product: String,
    /// Target account identifier
    pub account: String,
    /// Target region identifier
    pub region: String,
    /// Network settings
    pub network: NetworkSettings,
    /// Storage settings
    pub storage: StorageSettings,
    /// Compute settings
    pub compute: ComputeSettings,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            region: DEFAULT_REGION.to_string(),
            network: NetworkSettings::default(),
            storage: StorageSettings::default(),
            compute: ComputeSettings::default(),
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// VPC CIDR block
    pub cidr: String,
    /// Number of availability zones to span (minimum 2)
    pub az_count: u8,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_VPC_CIDR.to_string(),
            az_count: DEFAULT_AZ_COUNT,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Removal policy override; the environment default applies when unset
    pub removal_policy: Option<RemovalPolicy>,
}

/// Compute settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    /// Autoscaling bounds override; the environment default applies when unset
    pub scaling: Option<ScalingSettings>,
}

/// Autoscaling bounds as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingSettings {
    pub min: u32,
    pub desired: u32,
    pub max: u32,
}

impl SynthConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigurationError::Unreadable { message, .. } => ConfigurationError::Unreadable {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(content).map_err(|e| ConfigurationError::Unreadable {
            path: Default::default(),
            message: e.to_string(),
        })
    }

    /// Load configuration from an optional path, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_account(mut self, account: Option<impl Into<String>>) -> Self {
        if let Some(account) = account {
            self.account = account.into();
        }
        self
    }

    pub fn with_region(mut self, region: Option<impl Into<String>>) -> Self {
        if let Some(region) = region {
            self.region = region.into();
        }
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.storage.removal_policy = Some(policy);
        self
    }

    pub fn with_az_count(mut self, az_count: u8) -> Self {
        self.network.az_count = az_count;
        self
    }

    pub fn with_scaling(mut self, min: u32, desired: u32, max: u32) -> Self {
        self.compute.scaling = Some(ScalingSettings { min, desired, max });
        self
    }
}
