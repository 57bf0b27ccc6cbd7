//! Reading configuration files
//!
//! Two tags are resolved while a file is loaded:
//!
//! - `!include file.yaml` splices in another file, relative to the file naming it
//! - `!env_var NAME` reads an environment variable as a YAML scalar, so
//!   `WORKERS=4` becomes the number 4
//!
//! Other tags are left in place.

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};

/// Load `file` from `config_dir`, resolving tags
pub fn load_yaml(config_dir: impl AsRef<Path>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    Includes::default().read(&config_dir.as_ref().join(file))
}

/// Parse YAML text as if it were the file `source_name` in `config_dir`
pub fn load_yaml_string(
    config_dir: impl AsRef<Path>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let origin = config_dir.as_ref().join(source_name);
    Includes::default().parse(content, &origin)
}

/// Files on the current include path, outermost first
#[derive(Default)]
struct Includes {
    chain: Vec<PathBuf>,
}

impl Includes {
    fn read(&mut self, path: &Path) -> ConfigResult<Value> {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.chain.contains(&path) {
            let mut chain = self.chain.clone();
            chain.push(path);
            return Err(ConfigError::IncludeCycle { chain });
        }

        debug!(path = %path.display(), "Reading configuration file");
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        self.chain.push(path.clone());
        let value = self.parse(&text, &path);
        self.chain.pop();
        value
    }

    fn parse(&mut self, text: &str, origin: &Path) -> ConfigResult<Value> {
        let raw = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        self.resolve(raw, origin)
    }

    fn resolve(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        let resolved = match value {
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                if tag == "!include" {
                    let target = include_target(&value, origin)?;
                    trace!(from = %origin.display(), path = %target.display(), "Including file");
                    self.read(&target)?
                } else if tag == "!env_var" {
                    env_scalar(&value)?
                } else {
                    let value = self.resolve(value, origin)?;
                    Value::Tagged(Box::new(TaggedValue { tag, value }))
                }
            }
            Value::Mapping(entries) => Value::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, self.resolve(value, origin)?)))
                    .collect::<ConfigResult<_>>()?,
            ),
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.resolve(item, origin))
                    .collect::<ConfigResult<_>>()?,
            ),
            scalar => scalar,
        };
        Ok(resolved)
    }
}

fn include_target(value: &Value, origin: &Path) -> ConfigResult<PathBuf> {
    let Some(name) = value.as_str() else {
        return Err(ConfigError::InvalidValue {
            key: "!include".to_string(),
            reason: format!("expected a file name, got {:?}", value),
        });
    };

    let base = origin.parent().unwrap_or_else(|| Path::new("."));
    let target = base.join(name);
    if !target.is_file() {
        return Err(ConfigError::IncludeMissing {
            path: target,
            from: origin.to_path_buf(),
        });
    }
    Ok(target)
}

fn env_scalar(value: &Value) -> ConfigResult<Value> {
    let Some(var) = value.as_str() else {
        return Err(ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: format!("expected a variable name, got {:?}", value),
        });
    };

    let raw = std::env::var(var).map_err(|_| ConfigError::EnvVarNotFound {
        var: var.to_string(),
    })?;

    // Only plain scalars are typed, anything else stays a string
    Ok(match serde_yaml::from_str::<Value>(&raw) {
        Ok(scalar @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => scalar,
        _ => Value::String(raw),
    })
}
