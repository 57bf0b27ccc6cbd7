//! Threshold - debounce stage
//!
//! A threshold smooths out state changes of a condition that takes time to
//! stabilize or that reports wrong values from time to time (a short network
//! outage for a reachability check, for example). With a threshold of 3 at
//! least 3 identical updates in a row are needed before the state passes
//! further.
//!
//! Once the streak reaches the required count, every further identical update
//! fires the reactions again. Reactions are not edge triggered.

use ah_core::{ReactionResult, StateProcessor};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::trace;

use crate::binding::Binding;
use crate::error::{ExecutorError, ExecutorResult};
use crate::reaction::{Reaction, Reactions};

/// Current streak counters. At most one of them is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub true_streak: u32,
    pub false_streak: u32,
}

/// Debounce stage requiring `required_count` identical updates in a row
pub struct Threshold {
    required_count: u32,
    streaks: Mutex<Streaks>,
    reactions: Reactions,
    parent: Weak<Binding>,
}

impl Threshold {
    /// Create a standalone threshold
    pub fn new(required_count: u32) -> ExecutorResult<Arc<Self>> {
        Self::with_parent(required_count, Weak::new())
    }

    pub(crate) fn with_parent(
        required_count: u32,
        parent: Weak<Binding>,
    ) -> ExecutorResult<Arc<Self>> {
        if required_count == 0 {
            return Err(ExecutorError::InvalidThreshold(required_count));
        }

        Ok(Arc::new(Self {
            required_count,
            streaks: Mutex::new(Streaks::default()),
            reactions: Reactions::default(),
            parent,
        }))
    }

    /// Run `f` every time the true streak is at or above the required count
    pub fn on_true<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reactions.push(true, Reaction::action(f));
        self
    }

    /// Run `f` every time the false streak is at or above the required count
    pub fn on_false<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reactions.push(false, Reaction::action(f));
        self
    }

    /// Fallible variant of [`Threshold::on_true`]
    pub fn try_on_true<F>(&self, f: F) -> &Self
    where
        F: Fn() -> ReactionResult + Send + Sync + 'static,
    {
        self.reactions.push(true, Reaction::try_action(f));
        self
    }

    /// Fallible variant of [`Threshold::on_false`]
    pub fn try_on_false<F>(&self, f: F) -> &Self
    where
        F: Fn() -> ReactionResult + Send + Sync + 'static,
    {
        self.reactions.push(false, Reaction::try_action(f));
        self
    }

    /// Forward debounced states into another processor
    pub fn notify_state_processor<P>(&self, processor: P) -> &Self
    where
        P: StateProcessor + 'static,
    {
        self.reactions.push_processor(Arc::new(processor));
        self
    }

    /// Binding that created this threshold, if any and still alive
    pub fn parent(&self) -> Option<Arc<Binding>> {
        self.parent.upgrade()
    }

    pub fn required_count(&self) -> u32 {
        self.required_count
    }

    pub fn streaks(&self) -> Streaks {
        *self.streaks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of reactions attached for `state`
    pub fn reaction_count(&self, state: bool) -> usize {
        self.reactions.len(state)
    }

    /// Update the counters and report whether the reactions should fire
    fn record(&self, state: bool) -> bool {
        let mut streaks = self.streaks.lock().unwrap_or_else(PoisonError::into_inner);
        let streak = if state {
            streaks.false_streak = 0;
            streaks.true_streak = streaks.true_streak.saturating_add(1);
            streaks.true_streak
        } else {
            streaks.true_streak = 0;
            streaks.false_streak = streaks.false_streak.saturating_add(1);
            streaks.false_streak
        };

        trace!(threshold = %self, state, streak, "Threshold updated");
        streak >= self.required_count
    }
}

impl StateProcessor for Threshold {
    fn on_state_updated(&self, state: bool) -> ReactionResult {
        if self.record(state) {
            self.reactions.fire(state, self);
        }
        Ok(())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            Some(parent) => write!(f, "threshold({}) of {}", self.required_count, parent),
            None => write!(f, "threshold({})", self.required_count),
        }
    }
}

impl fmt::Debug for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Threshold")
            .field("required_count", &self.required_count)
            .field("streaks", &self.streaks())
            .field("reactions", &self.reactions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_core::ReactionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(threshold: &Threshold) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let trues = Arc::new(AtomicUsize::new(0));
        let falses = Arc::new(AtomicUsize::new(0));
        let t = trues.clone();
        let f = falses.clone();
        threshold
            .on_true(move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
            .on_false(move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
        (trues, falses)
    }

    fn feed(threshold: &Threshold, states: &[bool]) {
        for &state in states {
            threshold.on_state_updated(state).unwrap();
        }
    }

    #[test]
    fn test_is_true() {
        let threshold = Threshold::new(2).unwrap();
        let (trues, falses) = counting(&threshold);

        feed(&threshold, &[true, true]);

        assert_eq!(trues.load(Ordering::SeqCst), 1);
        assert_eq!(falses.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_false() {
        let threshold = Threshold::new(2).unwrap();
        let (trues, falses) = counting(&threshold);

        feed(&threshold, &[false, false, false]);

        assert_eq!(trues.load(Ordering::SeqCst), 0);
        assert_eq!(falses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_below_count_fires_nothing() {
        for n in 1..=6u32 {
            let threshold = Threshold::new(n).unwrap();
            let (trues, _) = counting(&threshold);

            for _ in 1..n {
                threshold.on_state_updated(true).unwrap();
            }
            assert_eq!(trues.load(Ordering::SeqCst), 0, "fired early for n={}", n);

            threshold.on_state_updated(true).unwrap();
            assert_eq!(trues.load(Ordering::SeqCst), 1, "n-th update for n={}", n);

            threshold.on_state_updated(true).unwrap();
            assert_eq!(trues.load(Ordering::SeqCst), 2, "re-fire for n={}", n);
        }
    }

    #[test]
    fn test_interleaved_reset() {
        let threshold = Threshold::new(3).unwrap();
        let (trues, falses) = counting(&threshold);

        feed(&threshold, &[false, false, true, false, false]);
        assert_eq!(falses.load(Ordering::SeqCst), 0);

        threshold.on_state_updated(false).unwrap();
        assert_eq!(falses.load(Ordering::SeqCst), 1);
        assert_eq!(trues.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_opposite_value_resets_streak() {
        let threshold = Threshold::new(5).unwrap();

        feed(&threshold, &[true, true, true]);
        assert_eq!(
            threshold.streaks(),
            Streaks {
                true_streak: 3,
                false_streak: 0
            }
        );

        threshold.on_state_updated(false).unwrap();
        assert_eq!(
            threshold.streaks(),
            Streaks {
                true_streak: 0,
                false_streak: 1
            }
        );
    }

    #[test]
    fn test_one_counter_nonzero_for_any_sequence() {
        let threshold = Threshold::new(2).unwrap();
        let pattern = [true, false, false, true, true, true, false, true, false, false];

        for state in pattern {
            threshold.on_state_updated(state).unwrap();
            let streaks = threshold.streaks();
            assert!(streaks.true_streak == 0 || streaks.false_streak == 0);
            assert!(streaks.true_streak + streaks.false_streak >= 1);
        }
    }

    #[test]
    fn test_count_of_one_fires_every_update() {
        let threshold = Threshold::new(1).unwrap();
        let (trues, falses) = counting(&threshold);

        feed(&threshold, &[true, false, true]);

        assert_eq!(trues.load(Ordering::SeqCst), 2);
        assert_eq!(falses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = Threshold::new(0).unwrap_err();
        assert_eq!(err, ExecutorError::InvalidThreshold(0));
    }

    #[test]
    fn test_parent_none() {
        assert!(Threshold::new(5).unwrap().parent().is_none());
    }

    #[test]
    fn test_required_count() {
        assert_eq!(Threshold::new(5).unwrap().required_count(), 5);
    }

    #[test]
    fn test_failing_reaction_does_not_stop_others() {
        let threshold = Threshold::new(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        threshold
            .try_on_true(|| Err(ReactionError::Failed("broken".into())))
            .on_true(|| panic!("also broken"))
            .on_true(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });

        assert!(threshold.on_state_updated(true).is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chained_thresholds() {
        let outer = Threshold::new(2).unwrap();
        let inner = Threshold::new(2).unwrap();
        let (trues, _) = counting(&inner);
        outer.notify_state_processor(inner.clone());

        // outer forwards from the 2nd update, inner needs two forwarded updates
        feed(&outer, &[true, true]);
        assert_eq!(trues.load(Ordering::SeqCst), 0);

        outer.on_state_updated(true).unwrap();
        assert_eq!(trues.load(Ordering::SeqCst), 1);
        assert_eq!(outer.reaction_count(true), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Threshold::new(3).unwrap().to_string(), "threshold(3)");
    }
}
