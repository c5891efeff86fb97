//! Core configuration traits

use crate::errors::{Result, VellumError};
use std::path::Path;

/// Prefix for environment overrides, e.g. `VELLUM_REPOSITORY_ID`
pub const ENV_PREFIX: &str = "VELLUM_";

/// Core trait for Vellum configuration types
pub trait VellumConfig: Clone + Default + Send + Sync + 'static {
    /// Load configuration from a TOML or JSON file
    fn load_from_file(path: &Path) -> Result<Self>
    where
        Self: serde::de::DeserializeOwned,
    {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VellumError::internal(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| VellumError::invalid_message(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| VellumError::invalid_message(format!("Invalid JSON: {e}"))),
            _ => Err(VellumError::invalid_message("Unsupported file format")),
        }
    }

    /// Merge with process environment variables carrying [`ENV_PREFIX`]
    fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Merge with an explicit set of `(name, value)` variables
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                let key = key.to_lowercase();
                if !self.set_from_string(&key, &value)? {
                    tracing::debug!(key = %key, "Ignoring unknown configuration override");
                }
            }
        }
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Set a configuration value from a string key
    ///
    /// Returns `false` when the key is not recognised.
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<bool>;
}
