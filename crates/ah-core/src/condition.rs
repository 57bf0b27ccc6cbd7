//! Condition capability
//!
//! A condition is a zero-argument check that produces a boolean or fails.
//! Failures are treated by the scheduler as "inconclusive for this tick".

use std::time::Duration;
use thiserror::Error;

/// Condition errors
#[derive(Debug, Clone, Error)]
pub enum ConditionError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Condition check failed: {0}")]
    Failed(String),

    #[error("Condition did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Condition panicked: {0}")]
    Panicked(String),

    #[error("Previous evaluation is still running")]
    StillRunning,
}

/// Result type for condition operations
pub type ConditionResult<T> = Result<T, ConditionError>;

/// Something that can be checked for a boolean outcome.
///
/// Implementations may block (network checks, sensor reads). They are shared
/// between threads, so any mutable data must sit behind interior mutability.
pub trait Condition: Send + Sync {
    /// Evaluate the condition once.
    fn evaluate(&self) -> ConditionResult<bool>;
}

impl<F> Condition for F
where
    F: Fn() -> ConditionResult<bool> + Send + Sync,
{
    fn evaluate(&self) -> ConditionResult<bool> {
        self()
    }
}

/// Tolerance used by [`equal_to`] and [`not_equal_to`]
pub const EPSILON: f64 = 0.001;

/// True while the sampled value is below `max`.
///
/// Typical use is a temperature sensor switching heating or cooling.
pub fn less_than<F>(max: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok(source() < max) }
}

/// True while the sampled value is at most `max`
pub fn less_than_or_equal<F>(max: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok(source() <= max) }
}

/// True while the sampled value is above `min`
pub fn greater_than<F>(min: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok(source() > min) }
}

/// True while the sampled value is at least `min`
pub fn greater_than_or_equal<F>(min: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok(source() >= min) }
}

/// True while the sampled value is within [`EPSILON`] of `value`
pub fn equal_to<F>(value: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok((source() - value).abs() < EPSILON) }
}

/// True while the sampled value is further than [`EPSILON`] from `value`
pub fn not_equal_to<F>(value: f64, source: F) -> impl Condition
where
    F: Fn() -> f64 + Send + Sync,
{
    move || -> ConditionResult<bool> { Ok((source() - value).abs() > EPSILON) }
}
