//! Single-flight execution slot

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::debug;

use super::token::CompletionToken;

/// Why a cycle ended without a matching completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartReason {
    /// `force_restart` was requested
    Forced,
    /// The queue's timeout elapsed first
    Timeout,
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Public view of the slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SlotState {
    Idle,
    Busy {
        queue: String,
        token: CompletionToken,
        started_at: DateTime<Utc>,
    },
}

impl SlotState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// The outstanding invocation while the slot is Busy
#[derive(Debug)]
pub(crate) struct ActiveCycle {
    pub token: CompletionToken,
    pub queue: String,
    pub started: Instant,
    pub started_at: DateTime<Utc>,
    timer: Option<AbortHandle>,
}

impl ActiveCycle {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(token = %self.token, "ActiveCycle::disarm: aborting timer");
            timer.abort();
        }
    }
}

/// Idle, or Busy with exactly one outstanding cycle
///
/// Idle implies no timer is armed and no invocation can release the slot.
#[derive(Debug, Default)]
pub(crate) enum ExecutionSlot {
    #[default]
    Idle,
    Busy(ActiveCycle),
}

impl ExecutionSlot {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    pub fn active_token(&self) -> Option<CompletionToken> {
        match self {
            Self::Idle => None,
            Self::Busy(cycle) => Some(cycle.token),
        }
    }

    /// Enter Busy for `queue`, returning the freshly minted token
    ///
    /// Callers check `is_busy` first; locking a Busy slot is a logic error.
    pub fn lock(&mut self, queue: &str) -> CompletionToken {
        debug_assert!(!self.is_busy(), "slot locked twice");
        let token = CompletionToken::new();
        debug!(%token, %queue, "ExecutionSlot::lock: called");
        *self = Self::Busy(ActiveCycle {
            token,
            queue: queue.to_string(),
            started: Instant::now(),
            started_at: Utc::now(),
            timer: None,
        });
        token
    }

    /// Attach the timeout task to the active cycle
    ///
    /// If `token` is no longer active the timer is aborted immediately.
    pub fn arm(&mut self, token: CompletionToken, timer: AbortHandle) {
        match self {
            Self::Busy(cycle) if cycle.token == token => {
                cycle.disarm();
                cycle.timer = Some(timer);
            }
            _ => {
                debug!(%token, "ExecutionSlot::arm: cycle already released");
                timer.abort();
            }
        }
    }

    /// Release iff `token` is the active one
    pub fn release(&mut self, token: CompletionToken) -> Option<ActiveCycle> {
        if self.active_token() != Some(token) {
            debug!(%token, "ExecutionSlot::release: stale token");
            return None;
        }
        self.force_release()
    }

    /// Release unconditionally
    pub fn force_release(&mut self) -> Option<ActiveCycle> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::Busy(mut cycle) => {
                cycle.disarm();
                Some(cycle)
            }
        }
    }

    pub fn state(&self) -> SlotState {
        match self {
            Self::Idle => SlotState::Idle,
            Self::Busy(cycle) => SlotState::Busy {
                queue: cycle.queue.clone(),
                token: cycle.token,
                started_at: cycle.started_at,
            },
        }
    }
}
