//! Pending request table
//!
//! Maps in-flight request ids to the oneshot sender that completes the
//! caller's wait. The receive task resolves entries; callers own a
//! [`PendingGuard`] that removes the entry again on every exit path
//! (response, timeout, or the waiting future being dropped).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;

/// A waiter, tagged with the registration that created it
#[derive(Debug)]
struct Entry {
    ticket: u64,
    tx: oneshot::Sender<Value>,
}

/// Shared id -> completion table
#[derive(Debug, Default)]
pub struct PendingRequests {
    table: Mutex<HashMap<String, Entry>>,
    next_ticket: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding this lock cannot leave the map half-updated
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an id and get the receiver its response will arrive on
    ///
    /// Re-registering an id replaces the earlier waiter, whose receiver then
    /// observes a closed channel.
    pub fn register(self: &Arc<Self>, id: &str) -> (PendingGuard, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if self.lock().insert(id.to_string(), Entry { ticket, tx }).is_some() {
            tracing::warn!("Request id {} registered twice; earlier waiter dropped", id);
        }
        let guard = PendingGuard {
            pending: Arc::clone(self),
            id: id.to_string(),
            ticket,
        };
        (guard, rx)
    }

    /// Complete the waiter for `id`
    ///
    /// Returns false for unknown ids (already resolved, timed out, or never
    /// sent by us); the response is dropped in that case.
    pub fn resolve(&self, id: &str, response: Value) -> bool {
        let sender = self.lock().remove(id);
        match sender {
            Some(entry) => entry.tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Removes its own registration from the table when dropped
///
/// A newer registration under the same id is left alone.
#[derive(Debug)]
pub struct PendingGuard {
    pending: Arc<PendingRequests>,
    id: String,
    ticket: u64,
}

impl PendingGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut table = self.pending.lock();
        if table.get(&self.id).is_some_and(|entry| entry.ticket == self.ticket) {
            table.remove(&self.id);
        }
    }
}
