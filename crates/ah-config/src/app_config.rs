//! Application configuration
//!
//! Parses `configuration.yaml`. Only the `scheduler:` section is read, other
//! top-level keys are left for the code that registers bindings.

use ah_executor::SchedulerConfig;
use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Name of the main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from a config directory.
    ///
    /// A missing `configuration.yaml` yields the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let path = config_dir.join(CONFIG_FILE);

        if !path.exists() {
            info!("No {} found in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    /// Parse configuration from a loaded YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        // An empty file parses as null
        if yaml.is_null() {
            return Ok(Self::default());
        }

        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let section = match mapping.get(&Value::String("scheduler".to_string())) {
            Some(Value::Null) | None => Value::Mapping(serde_yaml::Mapping::new()),
            Some(section) => section.clone(),
        };

        let scheduler: SchedulerConfig =
            serde_yaml::from_value(section).map_err(|e| ConfigError::InvalidValue {
                key: "scheduler".to_string(),
                reason: e.to_string(),
            })?;

        scheduler
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "scheduler".to_string(),
                reason: e.to_string(),
            })?;

        debug!(?scheduler, "Parsed scheduler configuration");
        Ok(Self { scheduler })
    }
}
