//! Owned dispatcher state
//!
//! Queues, rules, the execution slot and the empty-episode flag live here and
//! are only touched by the dispatcher task. Everything is synchronous; the
//! task layers timers, handler tasks and events on top.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::handler::QueueHandler;
use super::messages::{DispatchError, DispatchResult, DispatcherMetrics};
use super::slot::{ActiveCycle, ExecutionSlot, RestartReason, SlotState};
use super::token::CompletionToken;
use crate::rules::{Decision, QueueSnapshot, QueueView, Rule, RuleEngine};

struct QueueEntry {
    name: String,
    items: VecDeque<Value>,
    handler: Arc<dyn QueueHandler>,
    timeout: Duration,
}

/// An item taken off its queue and bound to a fresh cycle
pub(crate) struct Assignment {
    pub queue: String,
    pub token: CompletionToken,
    pub item: Value,
    pub handler: Arc<dyn QueueHandler>,
    pub timeout: Duration,
    pub decided_by: Decision,
}

/// Result of one `advance` step
pub(crate) enum Step {
    Busy,
    AllEmpty { notify: bool },
    SelectedEmpty { queue: String },
    Assigned(Assignment),
}

/// How the slot is being released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    Completed(CompletionToken),
    TimedOut(CompletionToken),
    Forced,
}

impl Release {
    /// The restart reason for non-completion releases
    pub fn restart_reason(self) -> Option<RestartReason> {
        match self {
            Self::Completed(_) => None,
            Self::TimedOut(_) => Some(RestartReason::Timeout),
            Self::Forced => Some(RestartReason::Forced),
        }
    }
}

#[derive(Default)]
pub(crate) struct DispatchState {
    /// Registration order is the fallback order
    queues: Vec<QueueEntry>,
    index: HashMap<String, usize>,
    engine: RuleEngine,
    slot: ExecutionSlot,
    empty_notified: bool,
    metrics: DispatcherMetrics,
}

impl DispatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_queue(&mut self, name: &str, handler: Arc<dyn QueueHandler>, timeout: Duration) -> DispatchResult<()> {
        debug!(%name, ?timeout, "DispatchState::register_queue: called");
        if self.index.contains_key(name) {
            return Err(DispatchError::DuplicateQueue { name: name.to_string() });
        }

        self.index.insert(name.to_string(), self.queues.len());
        self.queues.push(QueueEntry {
            name: name.to_string(),
            items: VecDeque::new(),
            handler,
            timeout,
        });
        self.metrics.registered_queues = self.queues.len();
        info!(%name, ?timeout, "Registered queue");
        Ok(())
    }

    pub fn register_rule(&mut self, rule: Rule) -> DispatchResult<()> {
        debug!(?rule, "DispatchState::register_rule: called");
        if !self.index.contains_key(rule.queue()) {
            return Err(DispatchError::UnknownQueue {
                name: rule.queue().to_string(),
            });
        }

        self.engine.add_rule(rule);
        self.metrics.registered_rules = self.engine.len();
        Ok(())
    }

    /// Append `item` and return the queue's new depth
    pub fn enqueue(&mut self, queue: &str, item: Value) -> DispatchResult<usize> {
        debug!(%queue, "DispatchState::enqueue: called");
        let entry = self.entry_mut(queue)?;
        entry.items.push_back(item);
        let depth = entry.items.len();

        self.empty_notified = false;
        self.metrics.enqueued += 1;
        Ok(depth)
    }

    pub fn queue_len(&self, queue: &str) -> DispatchResult<usize> {
        self.index
            .get(queue)
            .map(|&i| self.queues[i].items.len())
            .ok_or_else(|| DispatchError::UnknownQueue { name: queue.to_string() })
    }

    /// True iff every registered queue is empty
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.items.is_empty())
    }

    pub fn snapshot(&self) -> QueueSnapshot<'_> {
        QueueSnapshot::new(
            self.queues
                .iter()
                .map(|q| QueueView {
                    name: q.name.as_str(),
                    items: &q.items,
                })
                .collect(),
        )
    }

    /// Pick a queue, dequeue its head and lock the slot
    pub fn advance(&mut self) -> Step {
        debug!("DispatchState::advance: called");
        if self.slot.is_busy() {
            debug!("DispatchState::advance: slot busy");
            return Step::Busy;
        }

        let selection = self.engine.decide(&self.snapshot());
        let Some(selection) = selection else {
            let notify = !self.empty_notified;
            if notify {
                self.empty_notified = true;
                self.metrics.empty_notifications += 1;
                info!("All queues empty");
            }
            return Step::AllEmpty { notify };
        };

        let Some(&i) = self.index.get(&selection.queue) else {
            warn!(queue = %selection.queue, "Selected queue is not registered");
            return Step::SelectedEmpty { queue: selection.queue };
        };
        let entry = &mut self.queues[i];
        let Some(item) = entry.items.pop_front() else {
            warn!(queue = %selection.queue, "Selected queue is empty, skipping dispatch");
            return Step::SelectedEmpty { queue: selection.queue };
        };
        let handler = entry.handler.clone();
        let timeout = entry.timeout;

        let token = self.slot.lock(&selection.queue);
        self.metrics.dispatched += 1;
        debug!(queue = %selection.queue, %token, decided_by = %selection.decided_by, "DispatchState::advance: assigned");

        Step::Assigned(Assignment {
            queue: selection.queue,
            token,
            item,
            handler,
            timeout,
            decided_by: selection.decided_by,
        })
    }

    /// Single Busy -> Idle path for completions, timeouts and forced restarts
    pub fn release(&mut self, release: Release) -> Option<ActiveCycle> {
        debug!(?release, "DispatchState::release: called");
        let cycle = match release {
            Release::Completed(token) | Release::TimedOut(token) => self.slot.release(token),
            Release::Forced => self.slot.force_release(),
        };

        match (&cycle, release) {
            (Some(_), Release::Completed(_)) => self.metrics.completed += 1,
            (Some(_), Release::TimedOut(_)) => self.metrics.timeouts += 1,
            (Some(_), Release::Forced) => self.metrics.forced_restarts += 1,
            (None, Release::Completed(_)) => self.metrics.stale_completions += 1,
            (None, _) => {}
        }

        cycle
    }

    pub fn slot(&mut self) -> &mut ExecutionSlot {
        &mut self.slot
    }

    pub fn slot_state(&self) -> SlotState {
        self.slot.state()
    }

    pub fn metrics(&self) -> DispatcherMetrics {
        DispatcherMetrics {
            queued_items: self.queues.iter().map(|q| q.items.len()).sum(),
            ..self.metrics.clone()
        }
    }

    fn entry_mut(&mut self, queue: &str) -> DispatchResult<&mut QueueEntry> {
        match self.index.get(queue) {
            Some(&i) => Ok(&mut self.queues[i]),
            None => Err(DispatchError::UnknownQueue { name: queue.to_string() }),
        }
    }
}
