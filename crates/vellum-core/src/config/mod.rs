//! Repository configuration
//!
//! Loaded once at process start (file, then environment overrides), validated,
//! and then handed to the registry and evaluator constructors.

mod traits;
mod validation;

pub use traits::{VellumConfig, ENV_PREFIX};
pub use validation::{ConfigValidator, ValidationError, ValidationResult};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VellumError};
use crate::identifiers::principal_ids;
use crate::version::ProtocolVersion;

/// Permission spellings accepted for the default ACE
pub const PERMISSION_NAMES: &[&str] = &["cmis:none", "cmis:read", "cmis:write", "cmis:all"];

/// Default content stream limit (64 MiB)
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 64 * 1024 * 1024;

/// ACE applied to objects that carry no explicit entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAceConfig {
    /// Principal the entry grants to
    pub principal: String,
    /// Permission spelling (`cmis:read`, `cmis:write`, `cmis:all`)
    pub permission: String,
}

impl Default for DefaultAceConfig {
    fn default() -> Self {
        Self {
            principal: principal_ids::ANYONE.to_string(),
            permission: "cmis:all".to_string(),
        }
    }
}

/// Configuration of a single repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository identifier
    pub repository_id: String,
    /// Protocol version the repository speaks
    pub protocol_version: ProtocolVersion,
    /// Principal that bypasses ACL checks
    pub admin_principal: String,
    /// Principal id that matches every caller
    pub anyone_principal: String,
    /// ACE used when an object has no entries of its own
    pub default_ace: DefaultAceConfig,
    /// Whether new objects inherit their parent folder's ACL
    pub inherit_acl_by_default: bool,
    /// Upper bound for content stream length in bytes
    pub max_content_length: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repository_id: "default".to_string(),
            protocol_version: ProtocolVersion::default(),
            admin_principal: principal_ids::ADMIN.to_string(),
            anyone_principal: principal_ids::ANYONE.to_string(),
            default_ace: DefaultAceConfig::default(),
            inherit_acl_by_default: true,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

impl RepositoryConfig {
    /// Create a default configuration for the given repository id
    pub fn new(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VellumError::invalid_message(format!("Invalid TOML: {e}")))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .parse()
        .map_err(|_| VellumError::invalid_message(format!("Invalid boolean for {key}: {value}")))
}

impl VellumConfig for RepositoryConfig {
    fn validate(&self) -> Result<()> {
        let mut validator = ConfigValidator::new();
        validator
            .non_empty("repository_id", &self.repository_id)
            .non_empty("admin_principal", &self.admin_principal)
            .non_empty("anyone_principal", &self.anyone_principal)
            .non_empty("default_ace.principal", &self.default_ace.principal)
            .one_of(
                "default_ace.permission",
                &self.default_ace.permission,
                PERMISSION_NAMES,
            )
            .range("max_content_length", self.max_content_length, Some(1), None);
        validator.result().map_err(VellumError::from)
    }

    fn set_from_string(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "repository_id" => self.repository_id = value.to_string(),
            "protocol_version" => self.protocol_version = value.parse()?,
            "admin_principal" => self.admin_principal = value.to_string(),
            "anyone_principal" => self.anyone_principal = value.to_string(),
            "default_ace_principal" => self.default_ace.principal = value.to_string(),
            "default_ace_permission" => self.default_ace.permission = value.to_string(),
            "inherit_acl_by_default" => self.inherit_acl_by_default = parse_bool(key, value)?,
            "max_content_length" => {
                self.max_content_length = value.trim().parse().map_err(|_| {
                    VellumError::invalid_message(format!("Invalid byte count: {value}"))
                })?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RepositoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_ace.principal, "cmis:anyone");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RepositoryConfig::from_toml_str(
            r#"
            repository_id = "archive"
            protocol_version = "1.0"
            "#,
        )
        .unwrap();
        assert_eq!(config.repository_id, "archive");
        assert_eq!(config.protocol_version, ProtocolVersion::V1_0);
        assert_eq!(config.max_content_length, DEFAULT_MAX_CONTENT_LENGTH);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RepositoryConfig::default();
        config
            .merge_with_vars(vec![
                ("VELLUM_MAX_CONTENT_LENGTH".to_string(), "1024".to_string()),
                ("VELLUM_INHERIT_ACL_BY_DEFAULT".to_string(), "false".to_string()),
                ("VELLUM_UNRELATED".to_string(), "x".to_string()),
                ("PATH".to_string(), "/bin".to_string()),
            ])
            .unwrap();
        assert_eq!(config.max_content_length, 1024);
        assert!(!config.inherit_acl_by_default);
    }

    #[test]
    fn test_rejects_bad_permission() {
        let mut config = RepositoryConfig::default();
        config.default_ace.permission = "root".to_string();
        assert!(config.validate().is_err());
    }
}
