//! Engine-wide settings

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_document;
use ax_automation::ContextSettings;
use ax_core::{DeploymentEnvironment, MAX_DEBUG_VALUE_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every automation the engine evaluates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineSettings {
    /// Longest string kept in diagnostic bags
    pub max_debug_value_length: usize,
    /// Most items materialized for one entity list
    pub max_list_size: usize,
    pub environment: DeploymentEnvironment,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_debug_value_length: MAX_DEBUG_VALUE_LENGTH,
            max_list_size: 1000,
            environment: DeploymentEnvironment::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a YAML or JSON file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let value = load_document(path)?;
        let settings: Self =
            serde_json::from_value(value).map_err(|e| ConfigError::InvalidDocument {
                path: path.to_path_buf(),
                source: e,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_list_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_list_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_debug_value_length < 4 {
            return Err(ConfigError::InvalidValue {
                key: "max_debug_value_length".to_string(),
                reason: "must leave room for a truncation marker".to_string(),
            });
        }
        Ok(())
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            max_debug_value_length: self.max_debug_value_length,
            max_list_size: self.max_list_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_debug_value_length, 80);
        assert_eq!(settings.max_list_size, 1000);
        assert_eq!(settings.environment, DeploymentEnvironment::Development);
        assert_eq!(settings.context_settings(), ContextSettings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");
        fs::write(&path, "max_list_size: 25\nenvironment: production\n").unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.max_list_size, 25);
        assert_eq!(settings.max_debug_value_length, 80);
        assert_eq!(settings.environment, DeploymentEnvironment::Production);
    }

    #[test]
    fn test_rejects_empty_list_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "max_list_size": 0 }"#).unwrap();

        let err = EngineSettings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "max_list_size"));
    }
}
