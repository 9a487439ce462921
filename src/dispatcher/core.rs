//! Main Dispatcher task implementation

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::DispatcherConfig;
use super::handle::DispatcherHandle;
use super::handler::Completer;
use super::messages::{AdvanceOutcome, DispatchRequest};
use super::state::{Assignment, DispatchState, Release, Step};
use crate::events::{DispatchEvent, EventBus};

/// Owns all queue and slot state and serializes every transition
///
/// Requests, handler completions and timer firings all arrive on one
/// channel, so whichever of a completion and a timeout is processed first
/// wins and the other finds a stale token.
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchRequest>,
    rx: mpsc::Receiver<DispatchRequest>,
    state: DispatchState,
    events: Arc<EventBus>,
}

impl Dispatcher {
    /// Create a new Dispatcher with the given configuration
    pub fn new(config: DispatcherConfig) -> Self {
        debug!(?config, "Dispatcher::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let events = Arc::new(EventBus::new(config.event_capacity));
        Self {
            tx,
            rx,
            state: DispatchState::new(),
            events,
        }
    }

    /// Spawn the dispatcher task and return a handle to it
    pub fn spawn(config: DispatcherConfig) -> (DispatcherHandle, JoinHandle<()>) {
        let dispatcher = Self::new(config);
        let handle = dispatcher.handle();
        let task = tokio::spawn(dispatcher.run());
        (handle, task)
    }

    /// Create a client handle
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle::new(self.tx.clone(), self.events.clone())
    }

    /// Run the Dispatcher task
    ///
    /// This consumes the Dispatcher and runs until shutdown is requested.
    pub async fn run(mut self) {
        info!("Dispatcher started");

        while let Some(req) = self.rx.recv().await {
            match req {
                DispatchRequest::RegisterQueue {
                    name,
                    handler,
                    timeout,
                    reply_tx,
                } => {
                    let result = self.state.register_queue(&name, handler, timeout);
                    if result.is_ok() {
                        self.events.emit(DispatchEvent::QueueRegistered {
                            queue: name,
                            timeout_ms: millis(timeout),
                        });
                    }
                    let _ = reply_tx.send(result);
                }

                DispatchRequest::RegisterRule { rule, reply_tx } => {
                    let _ = reply_tx.send(self.state.register_rule(rule));
                }

                DispatchRequest::Enqueue { queue, item, reply_tx } => {
                    let result = self.state.enqueue(&queue, item);
                    if let Ok(depth) = result {
                        self.events.emit(DispatchEvent::ItemEnqueued { queue, depth });
                    }
                    let _ = reply_tx.send(result);
                }

                DispatchRequest::Advance { reply_tx } => {
                    let outcome = self.advance();
                    let _ = reply_tx.send(outcome);
                }

                DispatchRequest::Complete { token, reply_tx } => {
                    let released = self.release(Release::Completed(token));
                    if let Some(reply_tx) = reply_tx {
                        let _ = reply_tx.send(released);
                    }
                }

                DispatchRequest::Timeout { token } => {
                    self.release(Release::TimedOut(token));
                }

                DispatchRequest::ForceRestart { reply_tx } => {
                    let released = self.release(Release::Forced);
                    let _ = reply_tx.send(released);
                }

                DispatchRequest::IsEmpty { reply_tx } => {
                    let _ = reply_tx.send(self.state.is_empty());
                }

                DispatchRequest::QueueLen { queue, reply_tx } => {
                    let _ = reply_tx.send(self.state.queue_len(&queue));
                }

                DispatchRequest::GetSlotState { reply_tx } => {
                    let _ = reply_tx.send(self.state.slot_state());
                }

                DispatchRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(self.state.metrics());
                }

                DispatchRequest::Shutdown => {
                    info!("Dispatcher shutting down");
                    break;
                }
            }
        }

        if let Some(cycle) = self.state.slot().force_release() {
            warn!(queue = %cycle.queue, token = %cycle.token, "Abandoning in-flight item at shutdown");
        }

        info!("Dispatcher stopped");
    }

    fn advance(&mut self) -> AdvanceOutcome {
        match self.state.advance() {
            Step::Busy => AdvanceOutcome::Busy,
            Step::AllEmpty { notify } => {
                if notify {
                    self.events.emit(DispatchEvent::AllQueuesEmpty);
                }
                AdvanceOutcome::AllEmpty { notified: notify }
            }
            Step::SelectedEmpty { queue } => AdvanceOutcome::SelectedEmpty { queue },
            Step::Assigned(assignment) => self.start(assignment),
        }
    }

    /// Arm the timeout, then hand the item to its handler without waiting
    fn start(&mut self, assignment: Assignment) -> AdvanceOutcome {
        let Assignment {
            queue,
            token,
            item,
            handler,
            timeout,
            decided_by,
        } = assignment;

        let timeout_tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timeout_tx.send(DispatchRequest::Timeout { token }).await;
        });
        self.state.slot().arm(token, timer.abort_handle());

        info!(%queue, %token, %decided_by, ?timeout, "Dispatching item");
        self.events.emit(DispatchEvent::Dispatched {
            queue: queue.clone(),
            token,
            decided_by,
        });

        let completer = Completer::new(self.tx.clone());
        tokio::spawn(async move {
            handler.handle(token, item, completer).await;
        });

        AdvanceOutcome::Dispatched { queue, token }
    }

    fn release(&mut self, release: Release) -> bool {
        let Some(cycle) = self.state.release(release) else {
            debug!(?release, "Dispatcher::release: nothing to release");
            return false;
        };

        let elapsed_ms = millis(cycle.elapsed());
        match release.restart_reason() {
            None => {
                debug!(queue = %cycle.queue, token = %cycle.token, elapsed_ms, "Item completed");
                self.events.emit(DispatchEvent::Completed {
                    queue: cycle.queue,
                    token: cycle.token,
                    elapsed_ms,
                });
            }
            Some(reason) => {
                warn!(queue = %cycle.queue, token = %cycle.token, %reason, elapsed_ms, "Execution slot restarted");
                self.events.emit(DispatchEvent::Restarted {
                    queue: cycle.queue,
                    token: cycle.token,
                    reason,
                });
            }
        }
        true
    }
}

/// Whole milliseconds, clamped to `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::sync::mpsc::UnboundedSender;

    use super::*;
    use crate::dispatcher::handler::handler_fn;
    use crate::dispatcher::token::CompletionToken;
    use crate::dispatcher::{RestartReason, SlotState};

    type Seen = (CompletionToken, Value, Completer);

    /// Handler that forwards every invocation and never completes by itself
    fn capture(tx: UnboundedSender<Seen>) -> impl crate::dispatcher::QueueHandler {
        handler_fn(move |token, item, completer: Completer| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((token, item, completer));
            }
        })
    }

    #[tokio::test]
    async fn test_dispatch_and_complete() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        handle
            .register_queue("a", capture(seen_tx), Duration::from_secs(5))
            .await
            .unwrap();
        handle.enqueue("a", json!("job")).await.unwrap();

        let outcome = handle.advance().await.unwrap();
        let (token, item, completer) = seen_rx.recv().await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Dispatched { queue: "a".to_string(), token });
        assert_eq!(item, json!("job"));

        assert!(completer.complete(token).await.unwrap());
        assert_eq!(handle.slot_state().await.unwrap(), SlotState::Idle);

        // A duplicate completion is absorbed
        assert!(!completer.complete(token).await.unwrap());
        assert_eq!(handle.metrics().await.unwrap().stale_completions, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_releases_slot_once() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        let mut events = handle.subscribe();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        handle
            .register_queue("test", capture(seen_tx), Duration::from_millis(50))
            .await
            .unwrap();
        handle.enqueue("test", json!(1)).await.unwrap();
        handle.advance().await.unwrap();
        let (token, _, _completer) = seen_rx.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.slot_state().await.unwrap(), SlotState::Idle);

        let mut restarts = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DispatchEvent::Restarted { token: t, reason, .. } = event {
                restarts.push((t, reason));
            }
        }
        assert_eq!(restarts, vec![(token, RestartReason::Timeout)]);
        assert_eq!(handle.metrics().await.unwrap().timeouts, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_completion_disarms_timeout() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        handle
            .register_queue("a", capture(seen_tx), Duration::from_millis(50))
            .await
            .unwrap();
        handle.enqueue("a", json!(1)).await.unwrap();
        handle.advance().await.unwrap();

        let (token, _, completer) = seen_rx.recv().await.unwrap();
        assert!(completer.complete(token).await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.timeouts, 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_force_restart() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        let mut events = handle.subscribe();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        assert!(!handle.force_restart().await.unwrap());

        handle
            .register_queue("a", capture(seen_tx), Duration::from_secs(5))
            .await
            .unwrap();
        handle.enqueue("a", json!(1)).await.unwrap();
        handle.advance().await.unwrap();
        let (token, _, completer) = seen_rx.recv().await.unwrap();

        assert!(handle.force_restart().await.unwrap());
        assert!(!handle.force_restart().await.unwrap());

        // The restarted token can no longer release anything
        assert!(!completer.complete(token).await.unwrap());

        let restarted = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, DispatchEvent::Restarted { reason: RestartReason::Forced, .. }))
            .count();
        assert_eq!(restarted, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_handler_recovered_by_timeout() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        let mut events = handle.subscribe();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        handle
            .register_queue(
                "a",
                handler_fn(move |token, item: Value, completer: Completer| {
                    let seen_tx = seen_tx.clone();
                    async move {
                        if item == json!("boom") {
                            panic!("handler failed");
                        }
                        let _ = seen_tx.send(item);
                        let _ = completer.complete(token).await;
                    }
                }),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        handle.enqueue("a", json!("boom")).await.unwrap();
        handle.enqueue("a", json!("next")).await.unwrap();

        let AdvanceOutcome::Dispatched { token, .. } = handle.advance().await.unwrap() else {
            panic!("expected a dispatch");
        };
        assert_eq!(handle.advance().await.unwrap(), AdvanceOutcome::Busy);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.slot_state().await.unwrap(), SlotState::Idle);

        let restarts: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                DispatchEvent::Restarted { token, reason, .. } => Some((token, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(restarts, vec![(token, RestartReason::Timeout)]);

        assert!(handle.advance().await.unwrap().is_dispatched());
        assert_eq!(seen_rx.recv().await.unwrap(), json!("next"));

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.timeouts, 1);
        assert_eq!(metrics.dispatched, 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_millis_clamps() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
