//! Handler contract

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{DispatchError, DispatchRequest, DispatchResult};
use super::token::CompletionToken;

/// Processes items of one queue
///
/// Each invocation runs on its own task; the dispatcher never waits for it.
/// The handler must call [`Completer::complete`] with the token it was given
/// exactly once when it is done. A handler that never completes (or panics)
/// holds the slot until the queue's timeout fires.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, token: CompletionToken, item: Value, completer: Completer);
}

/// Sends completion signals back to the dispatcher
#[derive(Clone)]
pub struct Completer {
    tx: mpsc::Sender<DispatchRequest>,
}

impl Completer {
    pub(crate) fn new(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }

    /// Report completion of the cycle identified by `token`
    ///
    /// Returns `Ok(true)` if this released the slot and `Ok(false)` if the
    /// token was stale (the cycle already timed out or was restarted).
    pub async fn complete(&self, token: CompletionToken) -> DispatchResult<bool> {
        debug!(%token, "Completer::complete: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DispatchRequest::Complete {
                token,
                reply_tx: Some(reply_tx),
            })
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;

        reply_rx.await.map_err(|_| DispatchError::ReplyDropped)
    }

    /// Non-blocking completion for synchronous code paths
    pub fn try_complete(&self, token: CompletionToken) -> DispatchResult<()> {
        debug!(%token, "Completer::try_complete: called");
        self.tx
            .try_send(DispatchRequest::Complete { token, reply_tx: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::ChannelFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::ChannelClosed,
            })
    }
}

/// Adapts an async closure into a [`QueueHandler`]
pub struct FnHandler<F>(F);

/// Wrap `f` as a handler
///
/// ```rust,ignore
/// let handler = handler_fn(|token, item, completer: Completer| async move {
///     process(item).await;
///     let _ = completer.complete(token).await;
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(CompletionToken, Value, Completer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> QueueHandler for FnHandler<F>
where
    F: Fn(CompletionToken, Value, Completer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, token: CompletionToken, item: Value, completer: Completer) {
        (self.0)(token, item, completer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_handler_invokes_closure() {
        let (tx, mut rx) = mpsc::channel(4);
        let handler = handler_fn(|token, _item, completer: Completer| async move {
            let _ = completer.try_complete(token);
        });

        let token = CompletionToken::new();
        handler.handle(token, json!("x"), Completer::new(tx)).await;

        match rx.recv().await {
            Some(DispatchRequest::Complete { token: t, reply_tx }) => {
                assert_eq!(t, token);
                assert!(reply_tx.is_none());
            }
            _ => panic!("expected completion request"),
        }
    }

    #[tokio::test]
    async fn test_complete_on_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let completer = Completer::new(tx);
        let err = completer.complete(CompletionToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ChannelClosed));
    }

    #[test]
    fn test_try_complete_on_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let completer = Completer::new(tx);
        completer.try_complete(CompletionToken::new()).unwrap();
        let err = completer.try_complete(CompletionToken::new()).unwrap_err();
        assert!(matches!(err, DispatchError::ChannelFull));
    }
}
