//! Core capabilities for AutoHome
//!
//! This crate provides the narrow interfaces the rule engine consumes from its
//! collaborators: [`Condition`] (something that can be checked), [`StateProcessor`]
//! (something that consumes a boolean state) and [`Switch`] (a device that can be
//! turned on and off).
//!
//! Numeric comparisons against a sampled value ([`less_than`], [`equal_to`], ...)
//! are provided here. Other conditions and device drivers live outside of this
//! crate and only need to implement these traits.

mod condition;
mod processor;
mod switch;

pub use condition::{
    equal_to, greater_than, greater_than_or_equal, less_than, less_than_or_equal, not_equal_to,
    Condition, ConditionError, ConditionResult, EPSILON,
};
pub use processor::{ReactionError, ReactionResult, StateProcessor};
pub use switch::{FakeSwitch, Switch, SwitchProcessor};

/// Turn a panic payload into a readable message.
///
/// Used wherever caller-supplied code is isolated behind `catch_unwind` or a
/// blocking task, so the failure can be logged instead of propagated.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
