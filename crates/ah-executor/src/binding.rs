//! Binding
//!
//! A binding pairs one condition with its true and false reactions.
//! Bindings are only created by [`Scheduler::register`](crate::Scheduler::register)
//! and live as long as the scheduler.

use ah_core::{Condition, ReactionResult, StateProcessor};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ExecutorResult;
use crate::reaction::{DispatchSummary, Reaction, Reactions};
use crate::threshold::Threshold;

/// Stable identifier, assigned in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

/// Last successfully evaluated value of a binding's condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastState {
    pub state: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Connection between a condition and its reactions
pub struct Binding {
    id: BindingId,
    name: Option<String>,
    condition: Arc<dyn Condition>,
    reactions: Reactions,
    last_state: Mutex<Option<LastState>>,
    /// Set while the condition runs on the blocking pool
    evaluating: AtomicBool,
}

/// Marks a binding's condition as running until dropped
pub(crate) struct InFlight(Arc<Binding>);

impl InFlight {
    pub(crate) fn condition(&self) -> &Arc<dyn Condition> {
        &self.0.condition
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.evaluating.store(false, Ordering::SeqCst);
    }
}

impl Binding {
    pub(crate) fn new(id: BindingId, name: Option<String>, condition: Arc<dyn Condition>) -> Self {
        Self {
            id,
            name,
            condition,
            reactions: Reactions::default(),
            last_state: Mutex::new(None),
            evaluating: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn condition(&self) -> &Arc<dyn Condition> {
        &self.condition
    }

    /// Run `f` on every evaluation that returns true.
    ///
    /// This fires on every tick the condition holds, not only when the value changes.
    pub fn on_true<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reactions.push(true, Reaction::action(f));
        self
    }

    /// Run `f` on every evaluation that returns false.
    pub fn on_false<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reactions.push(false, Reaction::action(f));
        self
    }

    /// Fallible variant of [`Binding::on_true`]
    pub fn try_on_true<F>(&self, f: F) -> &Self
    where
        F: Fn() -> ReactionResult + Send + Sync + 'static,
    {
        self.reactions.push(true, Reaction::try_action(f));
        self
    }

    /// Fallible variant of [`Binding::on_false`]
    pub fn try_on_false<F>(&self, f: F) -> &Self
    where
        F: Fn() -> ReactionResult + Send + Sync + 'static,
    {
        self.reactions.push(false, Reaction::try_action(f));
        self
    }

    /// Forward every evaluated state into `processor`
    pub fn notify_state_processor<P>(&self, processor: P) -> &Self
    where
        P: StateProcessor + 'static,
    {
        self.reactions.push_processor(Arc::new(processor));
        self
    }

    /// Attach a new threshold fed by this binding.
    ///
    /// Reactions attached to the returned threshold only see debounced states.
    pub fn with_threshold(self: &Arc<Self>, required_count: u32) -> ExecutorResult<Arc<Threshold>> {
        let threshold = Threshold::with_parent(required_count, Arc::downgrade(self))?;
        self.notify_state_processor(threshold.clone());
        Ok(threshold)
    }

    /// Number of reactions attached for `state`
    pub fn reaction_count(&self, state: bool) -> usize {
        self.reactions.len(state)
    }

    /// Whether an evaluation started earlier has not returned yet.
    ///
    /// Stays set after a timed-out evaluation until the condition really finishes.
    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::SeqCst)
    }

    /// Claim the condition for one evaluation, unless one is still running
    pub(crate) fn begin_evaluation(self: &Arc<Self>) -> Option<InFlight> {
        if self.evaluating.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(InFlight(self.clone()))
    }

    pub fn last_state(&self) -> Option<LastState> {
        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an evaluated state to the matching reactions
    pub(crate) fn dispatch(&self, state: bool) -> DispatchSummary {
        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner) = Some(LastState {
            state,
            evaluated_at: Utc::now(),
        });
        self.reactions.fire(state, self)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reactions", &self.reactions)
            .field("last_state", &self.last_state())
            .field("evaluating", &self.is_evaluating())
            .finish()
    }
}
