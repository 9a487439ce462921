//! Single-flight dispatcher over named queues
//!
//! The dispatcher owns every queue and the execution slot:
//! - **advance:** ask the rule engine for a queue, dequeue its head, lock
//!   the slot, arm the queue's timeout and start the handler
//! - **complete:** a handler reports back with its token, unlocking the slot
//! - **restart:** a forced restart or an expired timeout unlocks the slot
//!   and emits `Restarted`

mod config;
mod core;
mod handle;
mod handler;
mod messages;
mod slot;
mod state;
mod token;

pub use config::DispatcherConfig;
pub use core::Dispatcher;
pub(crate) use core::millis;
pub use handle::DispatcherHandle;
pub use handler::{Completer, FnHandler, QueueHandler, handler_fn};
pub use messages::{AdvanceOutcome, DispatchError, DispatchResult, DispatcherMetrics};
pub use slot::{RestartReason, SlotState};
pub use token::CompletionToken;
