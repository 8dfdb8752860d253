//! Correlation store: in-flight requests and resolved responses.
//!
//! The store is the single piece of shared mutable state between the
//! executor's scheduling domain (which enqueues, polls, and expires) and
//! the bridge runtime's domain (which dispatches and resolves). Every
//! operation runs under one internal lock with short, non-awaiting
//! critical sections, so it can be called from either domain and from
//! `Drop` guards.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use courier_bus::Identity;

/// Identifier of one in-flight query.
///
/// Composed from the caller's context token, a second-resolution
/// timestamp, and a monotonic counter. The counter keeps ids unique even
/// for concurrent calls in the same context within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One in-flight query awaiting resolution or expiry.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Unique id handed back to the enqueuing stream.
    pub id: RequestId,
    /// The raw query text to dispatch.
    pub query: String,
    /// Set by the dispatch loop after the query went out. Only ever true
    /// once a target has been recorded.
    pub sent: bool,
    /// The identity the query was dispatched to; absent until dispatch.
    pub target: Option<Identity>,
    /// When the request was enqueued.
    pub created_at: DateTime<Utc>,
}

struct Inner {
    /// Pending entries in creation order. The order matters: `resolve`
    /// matches FIFO-by-creation when several entries share a target.
    pending: Vec<PendingRequest>,
    /// Resolved responses awaiting a `take`, keyed by request id.
    /// Write-once, read-once.
    responses: HashMap<RequestId, String>,
}

/// Shared table of in-flight requests and resolved responses.
pub struct CorrelationStore {
    inner: Mutex<Inner>,
    counter: AtomicU64,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                responses: HashMap::new(),
            }),
            counter: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-section;
        // the tables themselves stay consistent (no partial writes).
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a new pending request and return its id.
    pub fn enqueue(&self, context_id: &str, query: &str) -> RequestId {
        let created_at = Utc::now();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let id = RequestId(format!(
            "req_{context_id}_{}_{seq}",
            created_at.timestamp()
        ));

        let mut inner = self.lock();
        inner.pending.push(PendingRequest {
            id: id.clone(),
            query: query.to_string(),
            sent: false,
            target: None,
            created_at,
        });
        debug!(request_id = %id, pending = inner.pending.len(), "enqueued request");
        id
    }

    /// Snapshot of not-yet-sent entries as `(id, query)` pairs, in
    /// creation order. Used by the dispatch loop; the lock is released
    /// before any send happens.
    pub fn unsent(&self) -> Vec<(RequestId, String)> {
        self.lock()
            .pending
            .iter()
            .filter(|p| !p.sent)
            .map(|p| (p.id.clone(), p.query.clone()))
            .collect()
    }

    /// Record that a request was dispatched to `target`.
    ///
    /// Returns false if the entry no longer exists (resolved or expired
    /// between snapshot and send).
    pub fn mark_sent(&self, id: &RequestId, target: Identity) -> bool {
        let mut inner = self.lock();
        match inner.pending.iter_mut().find(|p| &p.id == id) {
            Some(entry) => {
                entry.target = Some(target);
                entry.sent = true;
                true
            }
            None => false,
        }
    }

    /// Resolve the oldest pending entry dispatched to `sender`.
    ///
    /// On a match the response moves into the cache under the entry's id
    /// and the entry leaves the pending table. At most one entry resolves
    /// per call; when several pending entries share the target, the first
    /// by creation order wins. Returns whether a match occurred.
    pub fn resolve(&self, sender: &Identity, response: &str) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner
            .pending
            .iter()
            .position(|p| p.target.as_ref() == Some(sender))
        else {
            return false;
        };
        let entry = inner.pending.remove(pos);
        inner
            .responses
            .insert(entry.id.clone(), response.to_string());
        debug!(request_id = %entry.id, sender = %sender, "resolved pending request");
        true
    }

    /// Remove and return the cached response for `id`, if any.
    ///
    /// Read-once: a second call for the same id returns `None`.
    pub fn take(&self, id: &RequestId) -> Option<String> {
        self.lock().responses.remove(id)
    }

    /// Remove a pending entry that never resolved. Used on timeout.
    ///
    /// Returns whether an entry was removed.
    pub fn expire(&self, id: &RequestId) -> bool {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|p| &p.id != id);
        before != inner.pending.len()
    }

    /// Drop all trace of a request: its pending entry and any unread
    /// cached response. Used when a stream is cancelled, so an abandoned
    /// request cannot linger in either table.
    pub fn abandon(&self, id: &RequestId) {
        let mut inner = self.lock();
        inner.pending.retain(|p| &p.id != id);
        inner.responses.remove(id);
    }

    /// Number of pending entries.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a pending entry with this id exists.
    pub fn contains_pending(&self, id: &RequestId) -> bool {
        self.lock().pending.iter().any(|p| &p.id == id)
    }
}

impl fmt::Debug for CorrelationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CorrelationStore")
            .field("pending", &inner.pending.len())
            .field("responses", &inner.responses.len())
            .finish()
    }
}
