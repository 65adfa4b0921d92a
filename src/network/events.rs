//! Event Dispatcher
//!
//! Fan-out of `connected`, `disconnected` and `data-received` notifications.
//!
//! Observers run synchronously on whichever thread detected the event: the
//! acceptor for `connected`, the reader for data, the liveness monitor (or
//! the caller of stop/disconnect) for `disconnected`. They must not assume a
//! particular thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::Connection;
use super::message::Message;

/// Handle returned by a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observers registered for one event kind
struct ObserverSet<T> {
    observers: RwLock<Vec<(SubscriptionId, Observer<T>)>>,
}

impl<T> ObserverSet<T> {
    fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: SubscriptionId, observer: Observer<T>) {
        self.observers.write().push((id, observer));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Invoke every observer registered at the time of the call
    ///
    /// The list is copied first so observers may subscribe or unsubscribe
    /// from inside a callback. A panicking observer is logged and skipped.
    fn fire(&self, event: &T, kind: &str) {
        let observers: Vec<Observer<T>> =
            self.observers.read().iter().map(|(_, o)| Arc::clone(o)).collect();

        for observer in observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                tracing::error!("A {} observer panicked", kind);
            }
        }
    }
}

/// Per-kind observer registry
pub struct EventDispatcher {
    next_id: AtomicU64,
    connected: ObserverSet<Arc<Connection>>,
    disconnected: ObserverSet<Arc<Connection>>,
    data_received: ObserverSet<Message>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connected: ObserverSet::new(),
            disconnected: ObserverSet::new(),
            data_received: ObserverSet::new(),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    pub fn on_connected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.connected.add(id, Arc::new(observer));
        id
    }

    pub fn on_disconnected<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.disconnected.add(id, Arc::new(observer));
        id
    }

    pub fn on_data<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.data_received.add(id, Arc::new(observer));
        id
    }

    /// Remove a subscription of any kind. Returns false if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.connected.remove(id) || self.disconnected.remove(id) || self.data_received.remove(id)
    }

    /// Total number of registered observers
    pub fn observer_count(&self) -> usize {
        self.connected.len() + self.disconnected.len() + self.data_received.len()
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    pub(crate) fn fire_connected(&self, connection: &Arc<Connection>) {
        self.connected.fire(connection, "connected");
    }

    pub(crate) fn fire_disconnected(&self, connection: &Arc<Connection>) {
        self.disconnected.fire(connection, "disconnected");
    }

    pub(crate) fn fire_data(&self, message: &Message) {
        self.data_received.fire(message, "data-received");
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
