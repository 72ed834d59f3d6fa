//! Secret generation specifications.
//!
//! A secret is described by a template: fixed fields plus exactly one field
//! the secret store generates at provisioning time. The generated value is
//! never part of the manifest; consumers hold a [`Credential::SecretRef`].

use std::collections::BTreeMap;

use serde::Serialize;

use tg_core::{ResourceId, TopologyError, TopologyResult};

pub const DATABASE_USERNAME: &str = "admin";
pub const GENERATED_FIELD: &str = "password";
pub const PASSWORD_LENGTH: u32 = 32;

/// Characters the database engine refuses in a master password, plus quotes
/// and whitespace that break shell and connection-string quoting.
pub const EXCLUDED_CHARACTERS: &str = "\"@/\\ '";

/// Characters the database engine itself rejects.
const ENGINE_FORBIDDEN: [char; 4] = ['/', '@', '"', ' '];

/// Password length bounds accepted by the database engine.
const ENGINE_MIN_LENGTH: u32 = 8;
const ENGINE_MAX_LENGTH: u32 = 41;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretTemplate {
    /// Fields stored verbatim
    pub fixed: BTreeMap<String, String>,
    /// Field the secret store fills in
    pub generate_key: String,
    pub length: u32,
    pub exclude_characters: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretSpec {
    pub id: ResourceId,
    pub description: String,
    pub template: SecretTemplate,
}

impl SecretSpec {
    /// Master credentials for the relational database.
    pub fn database_credentials(id: ResourceId) -> Self {
        Self {
            id,
            description: "Database master credentials".to_string(),
            template: SecretTemplate {
                fixed: BTreeMap::from([("username".to_string(), DATABASE_USERNAME.to_string())]),
                generate_key: GENERATED_FIELD.to_string(),
                length: PASSWORD_LENGTH,
                exclude_characters: EXCLUDED_CHARACTERS.to_string(),
            },
        }
    }

    pub fn reference(&self) -> Credential {
        Credential::SecretRef(self.id.clone())
    }

    /// Check the template can only produce passwords the engine accepts.
    pub fn validate(&self) -> TopologyResult<()> {
        let template = &self.template;
        let invalid = |reason: String| TopologyError::InvalidSecretTemplate {
            secret: self.id.clone(),
            reason,
        };

        if template.generate_key.is_empty() {
            return Err(invalid("no generated field".to_string()));
        }
        if template.fixed.contains_key(&template.generate_key) {
            return Err(invalid(format!(
                "generated field '{}' is also a fixed field",
                template.generate_key
            )));
        }
        if !(ENGINE_MIN_LENGTH..=ENGINE_MAX_LENGTH).contains(&template.length) {
            return Err(invalid(format!(
                "length {} is outside {}..={}",
                template.length, ENGINE_MIN_LENGTH, ENGINE_MAX_LENGTH
            )));
        }
        if let Some(c) = ENGINE_FORBIDDEN
            .iter()
            .find(|c| !template.exclude_characters.contains(**c))
        {
            return Err(invalid(format!("'{}' is not excluded", c)));
        }
        Ok(())
    }
}

/// How a database obtains its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Credential {
    SecretRef(ResourceId),
    /// Rejected at validation; only constructed from external input.
    Literal(String),
}
