//! Adapters - the coordinator's boundary to the voice SDK and the push channel
//!
//! Vendor objects never cross this boundary. Adapters translate them into the
//! narrow event types defined here and deliver them to handlers registered
//! through explicit subscriptions. The coordinator holds every
//! [`Subscription`] it creates and drops them on teardown.

pub mod channel;
pub mod memory;
pub mod telephony;

pub use channel::{CallEvent, CallEventType, StatusChannel, VoicemailEvent};
pub use memory::{MemoryChannel, MemoryTelephony, TelephonyCommand};
pub use telephony::{DialContext, TelephonyAdapter, TelephonyEvent};

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Callback invoked by an adapter for every event it delivers
pub type EventHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handle for a registered event handler
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) removes the
/// handler, so cleanup is tied to the owner's lifetime.
pub struct Subscription {
    id: u64,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a release callback run exactly once on unsubscribe or drop
    pub fn new(id: u64, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

struct RegistryInner<T> {
    next_id: u64,
    handlers: Vec<(u64, EventHandler<T>)>,
}

/// Handler list shared by adapter implementations
pub struct HandlerRegistry<T> {
    inner: Arc<Mutex<RegistryInner<T>>>,
}

impl<T: Clone + 'static> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 1,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn register(&self, handler: EventHandler<T>) -> Subscription
    where
        T: Send,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.push((id, handler));
            id
        };

        let weak: Weak<Mutex<RegistryInner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().handlers.retain(|(hid, _)| *hid != id);
            }
        })
    }

    /// Deliver an event to every handler; returns how many received it
    pub fn emit(&self, event: T) -> usize {
        // Handlers run outside the lock so they may (un)subscribe
        let handlers: Vec<EventHandler<T>> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + 'static> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
