//! State processor capability
//!
//! State processors consume boolean state updates. They are used both as
//! debounce stages and as terminal reactions (switch togglers, notifiers).

use std::sync::Arc;
use thiserror::Error;

/// Errors raised by reactions and state processors
#[derive(Debug, Clone, Error)]
pub enum ReactionError {
    #[error("Reaction failed: {0}")]
    Failed(String),

    #[error("Reaction panicked: {0}")]
    Panicked(String),
}

/// Result type for reactions
pub type ReactionResult = Result<(), ReactionError>;

/// Consumer of boolean state updates.
///
/// Updates arrive on every evaluation, not only when the value changes.
pub trait StateProcessor: Send + Sync {
    /// Handle a new state value.
    fn on_state_updated(&self, state: bool) -> ReactionResult;
}

impl<P: StateProcessor + ?Sized> StateProcessor for Arc<P> {
    fn on_state_updated(&self, state: bool) -> ReactionResult {
        (**self).on_state_updated(state)
    }
}
