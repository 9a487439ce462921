//! Event types emitted by the dispatcher
//!
//! `AllQueuesEmpty` and `Restarted` are the two notifications external
//! subscribers react to; the remaining variants trace the item lifecycle.

use serde::{Deserialize, Serialize};

use crate::dispatcher::{CompletionToken, RestartReason};
use crate::rules::Decision;

/// Observable dispatcher activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DispatchEvent {
    /// A queue was registered
    QueueRegistered { queue: String, timeout_ms: u64 },

    /// An item was appended to a queue
    ItemEnqueued { queue: String, depth: usize },

    /// A queue's head item was handed to its handler
    Dispatched {
        queue: String,
        token: CompletionToken,
        decided_by: Decision,
    },

    /// The handler reported completion with the active token
    Completed {
        queue: String,
        token: CompletionToken,
        elapsed_ms: u64,
    },

    /// The slot was released without a completion (forced or timed out)
    Restarted {
        queue: String,
        token: CompletionToken,
        reason: RestartReason,
    },

    /// Every queue is empty; emitted once per empty episode
    AllQueuesEmpty,
}

impl DispatchEvent {
    /// Short name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::QueueRegistered { .. } => "queue_registered",
            Self::ItemEnqueued { .. } => "item_enqueued",
            Self::Dispatched { .. } => "dispatched",
            Self::Completed { .. } => "completed",
            Self::Restarted { .. } => "restarted",
            Self::AllQueuesEmpty => "all_queues_empty",
        }
    }

    /// Queue the event concerns, if any
    pub fn queue(&self) -> Option<&str> {
        match self {
            Self::QueueRegistered { queue, .. }
            | Self::ItemEnqueued { queue, .. }
            | Self::Dispatched { queue, .. }
            | Self::Completed { queue, .. }
            | Self::Restarted { queue, .. } => Some(queue),
            Self::AllQueuesEmpty => None,
        }
    }
}
