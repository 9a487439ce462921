//! Message types for the Dispatcher
//!
//! Requests and replies for the actor pattern.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

use super::handler::QueueHandler;
use super::slot::SlotState;
use super::token::CompletionToken;
use crate::rules::Rule;

/// Errors from dispatcher operations
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Queue already registered: {name}")]
    DuplicateQueue { name: String },

    #[error("Unknown queue: {name}")]
    UnknownQueue { name: String },

    #[error("Dispatcher channel closed")]
    ChannelClosed,

    #[error("Dispatcher channel full")]
    ChannelFull,

    #[error("Dispatcher dropped the reply")]
    ReplyDropped,
}

/// Response from dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// What a call to `advance` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AdvanceOutcome {
    /// An item is already in flight; nothing happened
    Busy,

    /// Every queue is empty; `notified` is true when this call emitted the
    /// all-queues-empty notification
    AllEmpty { notified: bool },

    /// The selected queue had nothing to dequeue
    SelectedEmpty { queue: String },

    /// The head item of `queue` was handed to its handler
    Dispatched { queue: String, token: CompletionToken },
}

impl AdvanceOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherMetrics {
    pub registered_queues: usize,
    pub registered_rules: usize,
    pub queued_items: usize,
    pub enqueued: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub forced_restarts: u64,
    pub stale_completions: u64,
    pub empty_notifications: u64,
}

/// Requests to the Dispatcher task
pub enum DispatchRequest {
    RegisterQueue {
        name: String,
        handler: Arc<dyn QueueHandler>,
        timeout: Duration,
        reply_tx: oneshot::Sender<DispatchResult<()>>,
    },

    RegisterRule {
        rule: Rule,
        reply_tx: oneshot::Sender<DispatchResult<()>>,
    },

    /// Append an item; replies with the new queue depth
    Enqueue {
        queue: String,
        item: Value,
        reply_tx: oneshot::Sender<DispatchResult<usize>>,
    },

    Advance {
        reply_tx: oneshot::Sender<AdvanceOutcome>,
    },

    /// Completion signal from a handler; the reply is true if it released the slot
    Complete {
        token: CompletionToken,
        reply_tx: Option<oneshot::Sender<bool>>,
    },

    /// Timeout firing (internal)
    Timeout { token: CompletionToken },

    ForceRestart {
        reply_tx: oneshot::Sender<bool>,
    },

    IsEmpty {
        reply_tx: oneshot::Sender<bool>,
    },

    QueueLen {
        queue: String,
        reply_tx: oneshot::Sender<DispatchResult<usize>>,
    },

    GetSlotState {
        reply_tx: oneshot::Sender<SlotState>,
    },

    GetMetrics {
        reply_tx: oneshot::Sender<DispatcherMetrics>,
    },

    /// Shutdown the dispatcher
    Shutdown,
}

impl std::fmt::Debug for DispatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegisterQueue { name, timeout, .. } => f
                .debug_struct("RegisterQueue")
                .field("name", name)
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            Self::RegisterRule { rule, .. } => f.debug_struct("RegisterRule").field("rule", rule).finish_non_exhaustive(),
            Self::Enqueue { queue, .. } => f.debug_struct("Enqueue").field("queue", queue).finish_non_exhaustive(),
            Self::Advance { .. } => write!(f, "Advance"),
            Self::Complete { token, .. } => f.debug_struct("Complete").field("token", token).finish_non_exhaustive(),
            Self::Timeout { token } => f.debug_struct("Timeout").field("token", token).finish(),
            Self::ForceRestart { .. } => write!(f, "ForceRestart"),
            Self::IsEmpty { .. } => write!(f, "IsEmpty"),
            Self::QueueLen { queue, .. } => f.debug_struct("QueueLen").field("queue", queue).finish_non_exhaustive(),
            Self::GetSlotState { .. } => write!(f, "GetSlotState"),
            Self::GetMetrics { .. } => write!(f, "GetMetrics"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_queue() {
        let err = DispatchError::DuplicateQueue { name: "a".to_string() };
        assert!(err.to_string().contains("a"));

        let err = DispatchError::UnknownQueue {
            name: "ghost".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown queue: ghost");
    }

    #[test]
    fn test_advance_outcome_serialization() {
        let json = serde_json::to_string(&AdvanceOutcome::AllEmpty { notified: true }).unwrap();
        assert!(json.contains("\"outcome\":\"all-empty\""));
        assert!(!AdvanceOutcome::Busy.is_dispatched());
    }
}
