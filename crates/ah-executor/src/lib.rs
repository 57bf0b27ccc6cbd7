//! Condition Scheduler
//!
//! This crate provides the periodic evaluation engine for AutoHome.
//! Conditions are polled on a fixed cadence and their boolean results are
//! forwarded to reactions, optionally through debounce stages.
//!
//! # Architecture
//!
//! ```text
//! TICK → CONDITION → REACTIONS
//!                  ↘ THRESHOLD → REACTIONS
//! ```
//!
//! - **Scheduler**: Owns all bindings and ticks at a fixed interval
//! - **Binding**: Pairs one condition with true/false reactions
//! - **Threshold**: Requires N identical results in a row before forwarding
//!
//! # Example
//!
//! ```ignore
//! use ah_core::{ConditionResult, FakeSwitch, SwitchProcessor};
//! use ah_executor::{Scheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let led = Arc::new(FakeSwitch::new("led"));
//!
//! scheduler
//!     .register_named("phone_home", || -> ConditionResult<bool> { Ok(true) })
//!     .with_threshold(2)?
//!     .notify_state_processor(SwitchProcessor::new(led));
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod reaction;
pub mod report;
pub mod scheduler;
pub mod threshold;

pub use binding::{Binding, BindingId, LastState};
pub use config::SchedulerConfig;
pub use error::{ExecutorError, ExecutorResult};
pub use reaction::{Action, DispatchSummary, Reaction};
pub use report::{binding_budget, BindingOutcome, Evaluation, TickReport};
pub use scheduler::Scheduler;
pub use threshold::{Streaks, Threshold};
