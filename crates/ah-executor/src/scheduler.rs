//! Scheduler
//!
//! The scheduler owns all bindings and checks them periodically. Each tick
//! snapshots the binding list, evaluates every condition on the blocking pool
//! (at most `workers` at a time) and dispatches results in registration order.
//!
//! Nothing that happens during a tick can stop the scheduler: failing
//! conditions and failing reactions are logged and skipped.

use ah_core::{panic_message, Condition, ConditionError, ConditionResult};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::binding::{Binding, BindingId, InFlight};
use crate::config::SchedulerConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::reaction::DispatchSummary;
use crate::report::{binding_budget, BindingOutcome, Evaluation, TickReport};

/// Capacity of the tick report channel
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// Periodic condition scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    /// All registered bindings, in registration order
    bindings: RwLock<Vec<Arc<Binding>>>,
    next_binding_id: AtomicU64,
    /// Serializes ticks from the loop and from `run_tick`
    tick_lock: Mutex<()>,
    ticks_completed: AtomicU64,
    running: AtomicBool,
    /// Incremented on every `start`, identifies the current tick loop
    generation: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    report_tx: broadcast::Sender<Arc<TickReport>>,
}

impl Scheduler {
    /// Create a scheduler and start ticking right away.
    ///
    /// Must be called from within a Tokio runtime. The first tick runs
    /// immediately, then once per `tick_interval`.
    pub fn new(config: SchedulerConfig) -> ExecutorResult<Arc<Self>> {
        let scheduler = Self::manual(config)?;
        scheduler.start()?;
        Ok(scheduler)
    }

    /// Create a scheduler without starting the tick loop.
    ///
    /// Ticks only happen through [`Scheduler::run_tick`] until
    /// [`Scheduler::start`] is called.
    pub fn manual(config: SchedulerConfig) -> ExecutorResult<Arc<Self>> {
        config.validate()?;

        let (shutdown_tx, _) = broadcast::channel(1);
        let (report_tx, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            config,
            bindings: RwLock::new(Vec::new()),
            next_binding_id: AtomicU64::new(1),
            tick_lock: Mutex::new(()),
            ticks_completed: AtomicU64::new(0),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown_tx,
            report_tx,
        }))
    }

    /// Start the periodic tick loop
    pub fn start(self: &Arc<Self>) -> ExecutorResult<()> {
        let handle = Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?;

        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return Ok(());
        }

        info!(
            workers = self.config.workers,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "Starting scheduler"
        );

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shutdown_rx = self.shutdown_tx.subscribe();
        handle.spawn(Self::run(
            Arc::downgrade(self),
            generation,
            self.config.tick_interval,
            shutdown_rx,
        ));
        Ok(())
    }

    /// Stop the tick loop. A tick in progress is finished first.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a condition and return its binding for attaching reactions
    pub fn register<C>(&self, condition: C) -> Arc<Binding>
    where
        C: Condition + 'static,
    {
        self.insert(None, Arc::new(condition))
    }

    /// Register a condition under a name used in diagnostics
    pub fn register_named<C>(&self, name: impl Into<String>, condition: C) -> Arc<Binding>
    where
        C: Condition + 'static,
    {
        self.insert(Some(name.into()), Arc::new(condition))
    }

    /// Register a condition that is shared with other bindings
    pub fn register_shared(&self, condition: Arc<dyn Condition>) -> Arc<Binding> {
        self.insert(None, condition)
    }

    fn insert(&self, name: Option<String>, condition: Arc<dyn Condition>) -> Arc<Binding> {
        let id = BindingId::new(self.next_binding_id.fetch_add(1, Ordering::SeqCst));
        let binding = Arc::new(Binding::new(id, name, condition));

        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        bindings.push(binding.clone());
        debug!(binding = %binding, total = bindings.len(), "Registered binding");

        binding
    }

    /// Snapshot of all bindings, in registration order
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn ticks_completed(&self) -> u64 {
        self.ticks_completed.load(Ordering::SeqCst)
    }

    /// Receive a report after every tick
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TickReport>> {
        self.report_tx.subscribe()
    }

    /// Run one tick now.
    ///
    /// Waits for a tick already in progress, so ticks never overlap.
    pub async fn run_tick(&self) -> Arc<TickReport> {
        let _guard = self.tick_lock.lock().await;

        let tick = self.ticks_completed() + 1;
        let started_at = Utc::now();
        let start = Instant::now();

        let bindings = self.bindings();
        let budget = binding_budget(self.config.tick_interval, bindings.len());
        trace!(tick, bindings = bindings.len(), "Tick started");

        let timeout = self.config.condition_timeout;
        let mut evaluations = stream::iter(bindings)
            .map(move |binding| async move {
                let result = match binding.begin_evaluation() {
                    Some(in_flight) => evaluate(in_flight, timeout).await,
                    None => (Err(ConditionError::StillRunning), Duration::ZERO),
                };
                (binding, result)
            })
            .buffered(self.config.workers);

        let mut outcomes = Vec::new();
        while let Some((binding, (result, evaluation_time))) = evaluations.next().await {
            let outcome = Self::dispatch(&binding, result, evaluation_time, budget).await;
            outcomes.push(outcome);
        }

        let report = Arc::new(TickReport {
            tick,
            started_at,
            duration: start.elapsed(),
            outcomes,
        });

        self.ticks_completed.fetch_add(1, Ordering::SeqCst);
        trace!(tick, duration_ms = report.duration.as_millis() as u64, "Tick finished");

        // No subscribers is fine
        let _ = self.report_tx.send(report.clone());
        report
    }

    /// Route one evaluation result to the binding's reactions and check its budget
    async fn dispatch(
        binding: &Arc<Binding>,
        result: ConditionResult<bool>,
        evaluation_time: Duration,
        budget: Duration,
    ) -> BindingOutcome {
        let dispatch_start = Instant::now();

        let evaluation = match result {
            Ok(state) => {
                let target = binding.clone();
                let summary =
                    match tokio::task::spawn_blocking(move || target.dispatch(state)).await {
                        Ok(summary) => summary,
                        Err(e) => {
                            error!(binding = %binding, error = %e, "Dispatch task failed");
                            DispatchSummary::default()
                        }
                    };
                Evaluation::Dispatched {
                    state,
                    reactions: summary.invoked,
                    failed_reactions: summary.failed,
                }
            }
            Err(e) => {
                error!(binding = %binding, error = %e, "Can't check condition");
                Evaluation::Failed(e)
            }
        };

        let outcome = BindingOutcome {
            binding: binding.id(),
            evaluation,
            elapsed: evaluation_time + dispatch_start.elapsed(),
            budget,
        };

        if outcome.over_budget() {
            warn!(
                binding = %binding,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                budget_ms = outcome.budget.as_millis() as u64,
                percent_over_budget = outcome.percent_over_budget(),
                "Binding is taking more time than it should"
            );
        }

        outcome
    }

    async fn run(
        scheduler: Weak<Self>,
        generation: u64,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(scheduler) = scheduler.upgrade() else {
                        debug!("Scheduler dropped, stopping tick loop");
                        break;
                    };

                    let report = scheduler.run_tick().await;
                    if report.duration > interval {
                        warn!(
                            tick = report.tick,
                            duration_ms = report.duration.as_millis() as u64,
                            interval_ms = interval.as_millis() as u64,
                            "Tick overran its interval, next tick delayed"
                        );
                    }
                }
            }
        }

        // A newer loop may already be running after stop() + start()
        if let Some(scheduler) = scheduler.upgrade() {
            if scheduler.generation.load(Ordering::SeqCst) == generation {
                scheduler.running.store(false, Ordering::SeqCst);
            }
        }
        info!(generation, "Scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("bindings", &self.binding_count())
            .field("ticks_completed", &self.ticks_completed())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Evaluate a condition on the blocking pool, applying the optional deadline.
///
/// Returns the result and the time the condition itself ran. Time spent
/// waiting to be polled by the tick is not counted. `in_flight` is released
/// when the condition returns, even if the deadline passed long before.
async fn evaluate(
    in_flight: InFlight,
    timeout: Option<Duration>,
) -> (ConditionResult<bool>, Duration) {
    let task = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| in_flight.condition().evaluate()))
            .unwrap_or_else(|payload| {
                Err(ConditionError::Panicked(panic_message(payload.as_ref())))
            });
        let elapsed = start.elapsed();
        drop(in_flight);
        (result, elapsed)
    });

    match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => flatten(joined),
            // The blocking thread keeps running until the condition returns
            Err(_) => (Err(ConditionError::TimedOut(limit)), limit),
        },
        None => flatten(task.await),
    }
}

fn flatten(
    joined: Result<(ConditionResult<bool>, Duration), JoinError>,
) -> (ConditionResult<bool>, Duration) {
    match joined {
        Ok(evaluated) => evaluated,
        Err(e) => (Err(ConditionError::Failed(e.to_string())), Duration::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn manual() -> Arc<Scheduler> {
        Scheduler::manual(SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_register_preserves_order() {
        let scheduler = manual();
        let a = scheduler.register(|| -> ConditionResult<bool> { Ok(true) });
        let b = scheduler.register_named("b", || -> ConditionResult<bool> { Ok(false) });

        let ids: Vec<_> = scheduler.bindings().iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
        assert!(a.id() < b.id());
        assert_eq!(b.name(), Some("b"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Scheduler::manual(SchedulerConfig::default().with_workers(0)).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidConfig { .. }));
    }

    #[test]
    fn test_new_outside_runtime() {
        let err = Scheduler::new(SchedulerConfig::default()).unwrap_err();
        assert_eq!(err, ExecutorError::NoRuntime);
    }

    #[test]
    fn test_run_tick_blocking_on_runtime() {
        let scheduler = manual();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler
            .register(|| -> ConditionResult<bool> { Ok(true) })
            .on_true(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });

        let report = tokio_test::block_on(scheduler.run_tick());

        assert_eq!(report.tick, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.ticks_completed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_condition_is_failure() {
        let scheduler = manual();
        let binding = scheduler.register(|| -> ConditionResult<bool> { panic!("sensor gone") });

        let report = scheduler.run_tick().await;

        match &report.outcome(binding.id()).unwrap().evaluation {
            Evaluation::Failed(ConditionError::Panicked(msg)) => assert_eq!(msg, "sensor gone"),
            other => panic!("unexpected evaluation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_tick() {
        let scheduler = manual();
        let report = scheduler.run_tick().await;
        assert!(report.outcomes.is_empty());
    }
}
