//! Tick reports
//!
//! Every tick produces a [`TickReport`] describing what happened to each
//! binding and how long it took compared to its time budget.

use ah_core::ConditionError;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::binding::BindingId;

/// Time one binding may take before a warning is logged.
///
/// Half of the interval share of a single binding:
/// `(interval_ms / binding_count) / 2`.
pub fn binding_budget(tick_interval: Duration, binding_count: usize) -> Duration {
    let interval_ms = u64::try_from(tick_interval.as_millis()).unwrap_or(u64::MAX);
    let count = binding_count.max(1) as u64;
    Duration::from_millis(interval_ms / count / 2)
}

/// What happened to a binding's condition during a tick
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// Condition produced a value and the reactions were run
    Dispatched {
        state: bool,
        reactions: usize,
        failed_reactions: usize,
    },

    /// Condition failed, nothing was dispatched
    Failed(ConditionError),
}

impl Evaluation {
    pub fn state(&self) -> Option<bool> {
        match self {
            Evaluation::Dispatched { state, .. } => Some(*state),
            Evaluation::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Evaluation::Failed(_))
    }
}

/// Outcome for one binding within one tick
#[derive(Debug, Clone)]
pub struct BindingOutcome {
    pub binding: BindingId,
    pub evaluation: Evaluation,
    /// Evaluation plus dispatch time
    pub elapsed: Duration,
    pub budget: Duration,
}

impl BindingOutcome {
    pub fn over_budget(&self) -> bool {
        self.elapsed > self.budget
    }

    /// How far past the budget the binding went, in percent of the budget
    pub fn percent_over_budget(&self) -> u64 {
        let budget = self.budget.as_millis().max(1);
        let elapsed = self.elapsed.as_millis();
        let percent = elapsed.saturating_sub(budget).saturating_mul(100) / budget;
        u64::try_from(percent).unwrap_or(u64::MAX)
    }
}

/// Summary of one pass over all bindings
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Sequence number, starting at 1
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// One entry per binding, in registration order
    pub outcomes: Vec<BindingOutcome>,
}

impl TickReport {
    pub fn outcome(&self, binding: BindingId) -> Option<&BindingOutcome> {
        self.outcomes.iter().find(|o| o.binding == binding)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BindingOutcome> {
        self.outcomes.iter().filter(|o| o.evaluation.is_failed())
    }

    pub fn over_budget(&self) -> impl Iterator<Item = &BindingOutcome> {
        self.outcomes.iter().filter(|o| o.over_budget())
    }
}
