//! YAML configuration loading for autohome
//!
//! Configuration lives in `configuration.yaml` inside a config directory.
//! Two custom tags are understood:
//!
//! - `!include path` - Include another YAML file, relative to the including file
//! - `!env_var VAR` - Substitute an environment variable
//!
//! # Example
//!
//! ```ignore
//! use ah_config::AppConfig;
//!
//! let config = AppConfig::load("/etc/autohome")?;
//! let scheduler = Scheduler::new(config.scheduler)?;
//! ```

mod app_config;
mod error;
mod loader;

pub use app_config::{AppConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string};

pub use serde_yaml::Value;
