//! Pending-request registry.
//!
//! Each in-flight request owns one entry: a [`oneshot`] completion slot keyed
//! by its correlation id. An entry leaves the registry exactly once, through
//! whichever of [`PendingRequests::resolve`], [`PendingRequests::remove`]
//! (deadline) or [`PendingRequests::fail_all`] (transport failure) reaches it
//! first; the others find nothing and do nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{ClientError, Result};

/// Receiving half handed to the caller awaiting a response.
pub type Completion = oneshot::Receiver<Result<Value>>;

#[derive(Debug)]
struct Entry {
    method: String,
    slot: oneshot::Sender<Result<Value>>,
}

/// Registry of requests awaiting a response.
///
/// Ids start at 0 and increase strictly for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicI64,
    entries: Mutex<HashMap<i64, Entry>>,
}

impl PendingRequests {
    /// Create an empty registry whose first id is 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and register a completion slot for it.
    pub fn register(&self, method: &str) -> (i64, Completion) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (slot, completion) = oneshot::channel();
        self.lock().insert(
            id,
            Entry {
                method: method.to_owned(),
                slot,
            },
        );
        (id, completion)
    }

    /// Complete the entry for `id` with `outcome`.
    ///
    /// Returns `false` when no entry exists (already timed out, failed, or
    /// never sent); the outcome is dropped.
    pub fn resolve(&self, id: i64, outcome: Result<Value>) -> bool {
        let Some(entry) = self.lock().remove(&id) else {
            debug!(id, "pending: response for unknown or expired id ignored");
            return false;
        };
        if entry.slot.send(outcome).is_err() {
            debug!(id, method = entry.method.as_str(), "pending: caller stopped waiting");
        }
        true
    }

    /// Remove the entry for `id` without completing it.
    ///
    /// Returns `true` if the entry was still present.
    pub fn remove(&self, id: i64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Reject every pending entry with `error` and clear the registry.
    ///
    /// Returns the number of entries rejected.
    pub fn fail_all(&self, error: &ClientError) -> usize {
        let drained: Vec<(i64, Entry)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!(id, method = entry.method.as_str(), %error, "pending: rejecting on transport failure");
            let _ = entry.slot.send(Err(error.clone()));
        }
        count
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no request is awaiting a response.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
