//! Error types for the scheduler
//!
//! Only construction-time problems surface as errors. Everything that goes
//! wrong during a tick is logged and contained.

use thiserror::Error;

/// Result type for scheduler operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors that can occur while building the rule graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Threshold count must be at least one
    #[error("invalid threshold: required count must be positive, got {0}")]
    InvalidThreshold(u32),

    /// Scheduler parameters out of range
    #[error("invalid scheduler configuration for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// The tick loop needs a Tokio runtime to run on
    #[error("scheduler must be started from within a Tokio runtime")]
    NoRuntime,
}
