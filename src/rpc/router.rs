//! Notification fan-out.
//!
//! Every [`Subscription`] is an unbounded [`mpsc`] receiver fed by the single
//! reader task. [`NotificationRouter::dispatch`] delivers to a snapshot of the
//! subscriptions registered at that moment, so a consumer that subscribes or
//! unsubscribes while handling a notification never sees earlier traffic and
//! never disturbs ordering for anyone else. Payloads are forwarded untouched;
//! classification belongs to the consumer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::rpc::message::Notification;

type Registry = Mutex<RegistryState>;

#[derive(Debug, Default)]
struct RegistryState {
    next_key: u64,
    closed: bool,
    senders: HashMap<u64, mpsc::UnboundedSender<Notification>>,
}

/// Registry of active notification subscriptions.
#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    registry: Arc<Registry>,
}

impl NotificationRouter {
    /// Create a router with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription.
    ///
    /// The subscription receives every notification dispatched after this
    /// call returns, in arrival order. If the router is already closed the
    /// subscription is immediately at end-of-stream.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.registry);
        let key = state.next_key;
        state.next_key += 1;
        if !state.closed {
            state.senders.insert(key, tx);
        }
        drop(state);
        debug!(key, "router: subscription added");
        Subscription {
            key,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `notification` to every current subscription.
    ///
    /// Subscriptions whose receiver has gone away are pruned.
    pub fn dispatch(&self, notification: &Notification) {
        let mut state = lock(&self.registry);
        state
            .senders
            .retain(|_, tx| tx.send(notification.clone()).is_ok());
    }

    /// Drop every subscription and refuse new ones.
    ///
    /// Each live [`Subscription`] observes end-of-stream after draining the
    /// notifications already delivered to it.
    pub fn close(&self) {
        let mut state = lock(&self.registry);
        state.closed = true;
        let count = state.senders.len();
        state.senders.clear();
        drop(state);
        debug!(count, "router: closed");
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).senders.len()
    }
}

/// Receiving end of one router subscription.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    key: u64,
    rx: mpsc::UnboundedReceiver<Notification>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Wait for the next notification; `None` once the router is closed and
    /// the backlog is drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take the next notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Unregister explicitly; equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).senders.remove(&self.key);
            debug!(key = self.key, "router: subscription removed");
        }
    }
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, RegistryState> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
