//! Scheduler configuration
//!
//! Deserialized from the `scheduler:` section of the configuration file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExecutorError, ExecutorResult};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of conditions evaluated at the same time
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often all bindings are checked
    #[serde(default = "default_tick_interval", with = "duration_serde")]
    pub tick_interval: Duration,

    /// Deadline for a single condition evaluation
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub condition_timeout: Option<Duration>,
}

fn default_workers() -> usize {
    2
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(7)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            tick_interval: default_tick_interval(),
            condition_timeout: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_condition_timeout(mut self, timeout: Duration) -> Self {
        self.condition_timeout = Some(timeout);
        self
    }

    /// Check that every parameter is in range
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be a positive integer"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("tick_interval", "must be a positive duration"));
        }
        if self.condition_timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("condition_timeout", "must be a positive duration"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ExecutorError {
    ExecutorError::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Durations are written either as a number of seconds (`7`, `0.5`) or as
/// `SS`, `MM:SS` or `HH:MM:SS` strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(f64),
    Text(String),
}

impl DurationRepr {
    fn into_duration(self) -> Result<Duration, String> {
        match self {
            DurationRepr::Seconds(secs) => {
                Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
            }
            DurationRepr::Text(s) => parse_duration(&s),
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() == 1 {
        let secs: f64 = parts[0].parse().map_err(|_| "invalid seconds")?;
        return Duration::try_from_secs_f64(secs).map_err(|e| e.to_string());
    }
    if parts.len() > 3 {
        return Err("invalid duration format".to_string());
    }

    // Fold "HH:MM:SS" or "MM:SS" into seconds
    let mut total: u64 = 0;
    for part in parts {
        let value: u64 = part.parse().map_err(|_| format!("invalid duration component '{}'", part))?;
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or("invalid duration")?;
    }
    Ok(Duration::from_secs(total))
}

mod duration_serde {
    use super::DurationRepr;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        DurationRepr::deserialize(deserializer)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }
}

mod option_duration_serde {
    use super::DurationRepr;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_f64(d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<DurationRepr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(repr) => repr
                .into_duration()
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
