//! queuedispatch - Single-flight rule-driven queue dispatcher
//!
//! Work items wait in named FIFO queues. A tiered, weighted rule engine
//! picks which queue is served next, and at most one item is in flight at
//! any moment. A handler reports back with the completion token it was
//! given; a per-queue timeout or a forced restart frees the slot when it
//! does not.
//!
//! # Modules
//!
//! - [`rules`] - Priority tiers, rules, snapshots and the selection engine
//! - [`dispatcher`] - Queue ownership, execution slot and the dispatcher task
//! - [`events`] - Broadcast of dispatcher lifecycle events
//! - [`driver`] - Polling loop that drains the dispatcher
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod events;
pub mod rules;

// Re-export commonly used types
pub use config::{Config, QueueConfig, RuleConfig};
pub use dispatcher::{
    AdvanceOutcome, Completer, CompletionToken, DispatchError, DispatchResult, Dispatcher, DispatcherConfig,
    DispatcherHandle, DispatcherMetrics, QueueHandler, RestartReason, SlotState, handler_fn,
};
pub use driver::{DriveReport, drive_until_idle};
pub use events::{DispatchEvent, EventBus};
pub use rules::{Decision, PriorityTier, QueueSnapshot, Rule, RuleCondition, RuleEngine, Selection};
