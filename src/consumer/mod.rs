//! Event recipients
//!
//! A consumer is anything implementing [`ImageConsumer`]. Sources keep only
//! weak references to their consumers: dropping the last strong reference
//! counts as losing interest.

pub mod list;
pub mod observer;

use std::sync::Arc;

use crate::event::ImageEvent;
use crate::security::CallerContext;

pub use list::{ConsumerList, Registration};
pub use observer::{ImageObserver, ObserverStatus, WaitError};

/// Recipient of pixel-delivery events
///
/// Callbacks run on the decode worker thread. They may call back into the
/// source (for example to unregister themselves); the source never holds its
/// lock while a callback runs.
pub trait ImageConsumer: Send + Sync {
    /// Handle one event; `context` is the identity captured at registration
    fn on_event(&self, event: &ImageEvent, context: &CallerContext);

    /// Whether this consumer caches the decoded image
    ///
    /// Failures of passes that include a caching consumer carry the
    /// discard/reload flag.
    fn is_caching(&self) -> bool {
        false
    }
}

/// Shared handle to a consumer
pub type ConsumerRef = Arc<dyn ImageConsumer>;

/// Identity of a consumer object (its allocation address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerKey(usize);

impl ConsumerKey {
    pub fn of(consumer: &ConsumerRef) -> Self {
        Self(Arc::as_ptr(consumer) as *const () as usize)
    }
}
