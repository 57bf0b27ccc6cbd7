//! Switch capability
//!
//! A switch can be turned on and off any number of times. [`SwitchProcessor`]
//! lets a switch follow a boolean state directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::processor::{ReactionResult, StateProcessor};

/// On/off device
pub trait Switch: Send + Sync {
    /// Set the switch on.
    fn turn_on(&self);

    /// Set the switch off.
    fn turn_off(&self);

    /// Whether the switch is currently on.
    fn state(&self) -> bool;
}

/// In-memory switch that only logs its transitions.
///
/// Useful for dry runs and tests. Starts turned off.
#[derive(Debug)]
pub struct FakeSwitch {
    name: String,
    on: AtomicBool,
}

impl FakeSwitch {
    /// Create a new switch, initially off
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: AtomicBool::new(false),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Switch for FakeSwitch {
    fn turn_on(&self) {
        if !self.on.swap(true, Ordering::SeqCst) {
            info!(switch = %self.name, "Switch turned on");
        }
    }

    fn turn_off(&self) {
        if self.on.swap(false, Ordering::SeqCst) {
            info!(switch = %self.name, "Switch turned off");
        }
    }

    fn state(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

/// Adapter that drives a switch from state updates:
/// `true` turns it on, `false` turns it off.
pub struct SwitchProcessor<S: ?Sized> {
    switch: Arc<S>,
}

impl<S: Switch + ?Sized> SwitchProcessor<S> {
    pub fn new(switch: Arc<S>) -> Self {
        Self { switch }
    }

    /// The driven switch
    pub fn switch(&self) -> &Arc<S> {
        &self.switch
    }
}

impl<S: Switch + ?Sized> StateProcessor for SwitchProcessor<S> {
    fn on_state_updated(&self, state: bool) -> ReactionResult {
        if state {
            self.switch.turn_on();
        } else {
            self.switch.turn_off();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let switch = FakeSwitch::new("Test");
        assert!(!switch.state(), "fake switch was initially turned on");
        assert_eq!(switch.name(), "Test");
    }

    #[test]
    fn test_turn_on() {
        let switch = FakeSwitch::new("Test");
        switch.turn_on();
        assert!(switch.state(), "fake switch was off after turning it on");
    }

    #[test]
    fn test_turn_off() {
        let switch = FakeSwitch::new("Test");
        switch.turn_on();
        switch.turn_off();
        assert!(!switch.state(), "fake switch was on after turning it off");
    }

    #[test]
    fn test_repeated_turn_on_is_idempotent() {
        let switch = FakeSwitch::new("Test");
        switch.turn_on();
        switch.turn_on();
        assert!(switch.state());
    }

    #[test]
    fn test_processor_follows_state() {
        let switch = Arc::new(FakeSwitch::new("led"));
        let processor = SwitchProcessor::new(switch.clone());

        processor.on_state_updated(true).unwrap();
        assert!(switch.state());

        processor.on_state_updated(false).unwrap();
        assert!(!switch.state());
    }

    #[test]
    fn test_processor_with_dyn_switch() {
        let switch: Arc<dyn Switch> = Arc::new(FakeSwitch::new("relay"));
        let processor = SwitchProcessor::new(switch.clone());

        processor.on_state_updated(true).unwrap();
        assert!(processor.switch().state());
    }
}
