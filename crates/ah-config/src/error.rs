//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!include` names a file that does not exist
    #[error("{from} includes {path}, which does not exist")]
    IncludeMissing { path: PathBuf, from: PathBuf },

    /// Files including each other, outermost first
    #[error("include cycle: {}", show_chain(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("environment variable {var} is not set")]
    EnvVarNotFound { var: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

fn show_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
