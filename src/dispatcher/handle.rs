//! DispatcherHandle - client interface to the dispatcher task

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::handler::{Completer, QueueHandler};
use super::messages::{AdvanceOutcome, DispatchError, DispatchRequest, DispatchResult, DispatcherMetrics};
use super::slot::SlotState;
use super::token::CompletionToken;
use crate::events::{DispatchEvent, EventBus};
use crate::rules::Rule;

/// Cloneable handle used by drivers, producers and handlers
///
/// Every call is a round trip through the dispatcher task, so calls from
/// any number of tasks are applied one at a time.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchRequest>,
    events: Arc<EventBus>,
}

impl DispatcherHandle {
    pub(crate) fn new(tx: mpsc::Sender<DispatchRequest>, events: Arc<EventBus>) -> Self {
        debug!("DispatcherHandle::new: called");
        Self { tx, events }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> DispatchRequest) -> DispatchResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DispatchError::ReplyDropped)
    }

    /// Register a new, empty queue with its handler and timeout
    pub async fn register_queue<H>(&self, name: &str, handler: H, timeout: Duration) -> DispatchResult<()>
    where
        H: QueueHandler + 'static,
    {
        self.register_shared_queue(name, Arc::new(handler), timeout).await
    }

    /// Register a queue whose handler is shared with other queues
    pub async fn register_shared_queue(
        &self,
        name: &str,
        handler: Arc<dyn QueueHandler>,
        timeout: Duration,
    ) -> DispatchResult<()> {
        debug!(%name, ?timeout, "DispatcherHandle::register_queue: called");
        self.request(|reply_tx| DispatchRequest::RegisterQueue {
            name: name.to_string(),
            handler,
            timeout,
            reply_tx,
        })
        .await?
    }

    /// Append a rule to its tier; the target queue must already exist
    pub async fn register_rule(&self, rule: Rule) -> DispatchResult<()> {
        debug!(?rule, "DispatcherHandle::register_rule: called");
        self.request(|reply_tx| DispatchRequest::RegisterRule { rule, reply_tx })
            .await?
    }

    /// Append an item to a queue, returning the new depth
    pub async fn enqueue(&self, queue: &str, item: Value) -> DispatchResult<usize> {
        debug!(%queue, "DispatcherHandle::enqueue: called");
        self.request(|reply_tx| DispatchRequest::Enqueue {
            queue: queue.to_string(),
            item,
            reply_tx,
        })
        .await?
    }

    /// Dispatch the next item if the slot is idle
    pub async fn advance(&self) -> DispatchResult<AdvanceOutcome> {
        debug!("DispatcherHandle::advance: called");
        self.request(|reply_tx| DispatchRequest::Advance { reply_tx }).await
    }

    /// Report completion; true if `token` was active and the slot was released
    pub async fn complete(&self, token: CompletionToken) -> DispatchResult<bool> {
        debug!(%token, "DispatcherHandle::complete: called");
        self.completer().complete(token).await
    }

    /// A completer bound to this dispatcher
    pub fn completer(&self) -> Completer {
        Completer::new(self.tx.clone())
    }

    /// Release the slot if busy; true if something was in flight
    pub async fn force_restart(&self) -> DispatchResult<bool> {
        debug!("DispatcherHandle::force_restart: called");
        self.request(|reply_tx| DispatchRequest::ForceRestart { reply_tx })
            .await
    }

    /// True iff every registered queue is empty
    pub async fn is_empty(&self) -> DispatchResult<bool> {
        self.request(|reply_tx| DispatchRequest::IsEmpty { reply_tx }).await
    }

    pub async fn queue_len(&self, queue: &str) -> DispatchResult<usize> {
        self.request(|reply_tx| DispatchRequest::QueueLen {
            queue: queue.to_string(),
            reply_tx,
        })
        .await?
    }

    pub async fn slot_state(&self) -> DispatchResult<SlotState> {
        self.request(|reply_tx| DispatchRequest::GetSlotState { reply_tx })
            .await
    }

    pub async fn metrics(&self) -> DispatchResult<DispatcherMetrics> {
        self.request(|reply_tx| DispatchRequest::GetMetrics { reply_tx })
            .await
    }

    /// Subscribe to dispatcher events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Stop the dispatcher task
    pub async fn shutdown(&self) -> DispatchResult<()> {
        debug!("DispatcherHandle::shutdown: called");
        self.tx
            .send(DispatchRequest::Shutdown)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, DispatcherConfig, handler_fn};
    use crate::rules::PriorityTier;
    use serde_json::json;

    fn silent() -> impl QueueHandler {
        handler_fn(|_token, _item, _completer: Completer| async {})
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());

        handle.register_queue("a", silent(), Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            handle.register_queue("a", silent(), Duration::from_secs(1)).await,
            Err(DispatchError::DuplicateQueue { .. })
        ));
        assert!(matches!(
            handle.enqueue("missing", json!(1)).await,
            Err(DispatchError::UnknownQueue { .. })
        ));
        assert!(matches!(
            handle
                .register_rule(Rule::always(PriorityTier::High, "missing", 1))
                .await,
            Err(DispatchError::UnknownQueue { .. })
        ));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_queries() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        handle.register_queue("a", silent(), Duration::from_secs(1)).await.unwrap();

        assert!(handle.is_empty().await.unwrap());
        assert_eq!(handle.enqueue("a", json!(1)).await.unwrap(), 1);
        assert_eq!(handle.enqueue("a", json!(2)).await.unwrap(), 2);
        assert_eq!(handle.queue_len("a").await.unwrap(), 2);
        assert!(!handle.is_empty().await.unwrap());

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.registered_queues, 1);
        assert_eq!(metrics.queued_items, 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let (handle, task) = Dispatcher::spawn(DispatcherConfig::default());
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.advance().await, Err(DispatchError::ChannelClosed)));
    }
}
