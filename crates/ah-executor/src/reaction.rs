//! Reactions
//!
//! A reaction is what runs when a condition (or a threshold) produces a value.
//! Every invocation is isolated: an error or a panic in one reaction is logged
//! and the remaining reactions still run.

use ah_core::{panic_message, ReactionError, ReactionResult, StateProcessor};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, trace};

/// Caller-supplied action without arguments
pub type Action = Arc<dyn Fn() -> ReactionResult + Send + Sync>;

/// A single entry of a true or false reaction list
#[derive(Clone)]
pub enum Reaction {
    /// Plain action, fired on every matching evaluation
    Action(Action),

    /// Forwards a fixed state into a state processor
    Processor {
        processor: Arc<dyn StateProcessor>,
        state: bool,
    },
}

impl Reaction {
    /// Wrap an infallible closure
    pub fn action<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Reaction::Action(Arc::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap a fallible closure
    pub fn try_action<F>(f: F) -> Self
    where
        F: Fn() -> ReactionResult + Send + Sync + 'static,
    {
        Reaction::Action(Arc::new(f))
    }

    /// Run the reaction, converting panics into [`ReactionError::Panicked`]
    pub fn invoke(&self) -> ReactionResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match self {
            Reaction::Action(action) => action(),
            Reaction::Processor { processor, state } => processor.on_state_updated(*state),
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(ReactionError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reaction::Action(_) => f.write_str("Action"),
            Reaction::Processor { state, .. } => write!(f, "Processor({})", state),
        }
    }
}

/// Counts from one pass over a reaction list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Reactions that were invoked
    pub invoked: usize,
    /// Reactions that returned an error or panicked
    pub failed: usize,
}

/// True and false reaction lists shared by bindings and thresholds.
///
/// Lists are snapshotted before invocation, so a reaction may attach further
/// reactions without deadlocking. Those take effect on the next pass.
#[derive(Default)]
pub(crate) struct Reactions {
    on_true: RwLock<Vec<Reaction>>,
    on_false: RwLock<Vec<Reaction>>,
}

impl Reactions {
    fn list(&self, state: bool) -> &RwLock<Vec<Reaction>> {
        if state {
            &self.on_true
        } else {
            &self.on_false
        }
    }

    pub(crate) fn push(&self, state: bool, reaction: Reaction) {
        self.list(state)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reaction);
    }

    /// Attach a processor to both lists
    pub(crate) fn push_processor(&self, processor: Arc<dyn StateProcessor>) {
        self.push(
            true,
            Reaction::Processor {
                processor: processor.clone(),
                state: true,
            },
        );
        self.push(
            false,
            Reaction::Processor {
                processor,
                state: false,
            },
        );
    }

    pub(crate) fn len(&self, state: bool) -> usize {
        self.list(state)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn snapshot(&self, state: bool) -> Vec<Reaction> {
        self.list(state)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invoke every reaction registered for `state`, in attachment order.
    ///
    /// `owner` only shows up in log output.
    pub(crate) fn fire(&self, state: bool, owner: &dyn fmt::Display) -> DispatchSummary {
        let reactions = self.snapshot(state);
        let mut summary = DispatchSummary::default();

        for (index, reaction) in reactions.iter().enumerate() {
            summary.invoked += 1;
            if let Err(e) = reaction.invoke() {
                summary.failed += 1;
                error!(
                    owner = %owner,
                    index,
                    state,
                    reaction = ?reaction,
                    error = %e,
                    "Can't execute reaction"
                );
            }
        }

        trace!(owner = %owner, state, invoked = summary.invoked, "Reactions fired");
        summary
    }
}

impl fmt::Debug for Reactions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactions")
            .field("on_true", &self.len(true))
            .field("on_false", &self.len(false))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counter_reaction(counter: &Arc<AtomicUsize>) -> Reaction {
        let counter = counter.clone();
        Reaction::action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_action_invoke() {
        let count = Arc::new(AtomicUsize::new(0));
        let reaction = counter_reaction(&count);

        reaction.invoke().unwrap();
        reaction.invoke().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_action_returns_error() {
        let reaction = Reaction::try_action(|| Err(ReactionError::Failed("offline".into())));
        assert!(matches!(reaction.invoke(), Err(ReactionError::Failed(_))));
    }

    #[test]
    fn test_panicking_action_is_caught() {
        let reaction = Reaction::action(|| panic!("relay stuck"));
        match reaction.invoke() {
            Err(ReactionError::Panicked(msg)) => assert_eq!(msg, "relay stuck"),
            other => panic!("expected panic error, got {:?}", other),
        }
    }

    #[test]
    fn test_fire_runs_remaining_after_failure() {
        let count = Arc::new(AtomicUsize::new(0));
        let reactions = Reactions::default();
        reactions.push(true, counter_reaction(&count));
        reactions.push(true, Reaction::action(|| panic!("boom")));
        reactions.push(
            true,
            Reaction::try_action(|| Err(ReactionError::Failed("nope".into()))),
        );
        reactions.push(true, counter_reaction(&count));

        let summary = reactions.fire(true, &"test");

        assert_eq!(summary, DispatchSummary { invoked: 4, failed: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fire_only_matching_list() {
        let on_true = Arc::new(AtomicUsize::new(0));
        let on_false = Arc::new(AtomicUsize::new(0));
        let reactions = Reactions::default();
        reactions.push(true, counter_reaction(&on_true));
        reactions.push(false, counter_reaction(&on_false));

        reactions.fire(false, &"test");

        assert_eq!(on_true.load(Ordering::SeqCst), 0);
        assert_eq!(on_false.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fire_preserves_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let reactions = Reactions::default();
        for i in 0..3 {
            let order = order.clone();
            reactions.push(false, Reaction::action(move || order.lock().unwrap().push(i)));
        }

        reactions.fire(false, &"test");

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_list_fires_nothing() {
        let reactions = Reactions::default();
        assert_eq!(reactions.fire(true, &"test"), DispatchSummary::default());
    }

    struct Recorder(Mutex<Vec<bool>>);

    impl StateProcessor for Recorder {
        fn on_state_updated(&self, state: bool) -> ReactionResult {
            self.0.lock().unwrap().push(state);
            Ok(())
        }
    }

    #[test]
    fn test_processor_receives_both_states() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let reactions = Reactions::default();
        reactions.push_processor(recorder.clone());

        reactions.fire(true, &"test");
        reactions.fire(false, &"test");

        assert_eq!(reactions.len(true), 1);
        assert_eq!(reactions.len(false), 1);
        assert_eq!(*recorder.0.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_reaction_can_attach_more_reactions() {
        let reactions = Arc::new(Reactions::default());
        let inner = reactions.clone();
        reactions.push(
            true,
            Reaction::action(move || inner.push(true, Reaction::action(|| {}))),
        );

        let first = reactions.fire(true, &"test");
        let second = reactions.fire(true, &"test");

        assert_eq!(first.invoked, 1);
        assert_eq!(second.invoked, 2);
    }
}
