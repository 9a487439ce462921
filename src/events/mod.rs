//! Dispatcher notifications
//!
//! Every state transition of interest is emitted on a broadcast [`EventBus`].
//! Subscribers get a `broadcast::Receiver<DispatchEvent>` from
//! `DispatcherHandle::subscribe`.
//!
//! ```rust,ignore
//! let mut rx = handle.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     if let DispatchEvent::AllQueuesEmpty = event {
//!         scale_down().await;
//!     }
//! }
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use types::DispatchEvent;
