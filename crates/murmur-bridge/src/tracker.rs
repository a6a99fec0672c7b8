//! Request tracking for the engine control channel
//!
//! Correlation ids are unique per bridge instance (monotonic `AtomicU64`,
//! never reused for the life of the instance). Every registered request is
//! completed exactly once: by a matching response, by timeout removal, or by
//! the channel-closure drain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, Mutex};

use murmur_core::prelude::*;

/// Terminal outcome delivered to a waiting `send()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    /// Successful `result` payload.
    Result(serde_json::Value),
    /// Engine-reported error.
    Fault { message: String, code: Option<i64> },
    /// The channel died with this request still in flight.
    Terminated,
}

/// Tracks pending requests and matches responses by correlation id.
pub struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<EngineReply>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new pending request. Returns the fresh correlation id and
    /// the receiver for its single completion.
    pub async fn register(&self) -> (u64, oneshot::Receiver<EngineReply>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Resolve a pending request. Returns false when no entry exists for the
    /// id (stale or duplicate response) -- the caller drops the envelope.
    pub async fn resolve(&self, id: u64, reply: EngineReply) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(&id) {
            let _ = tx.send(reply);
            true
        } else {
            false
        }
    }

    /// Remove an entry without completing it (timeout path). A late response
    /// for the id is then stale and will be dropped by `resolve`.
    pub async fn remove(&self, id: u64) -> bool {
        self.pending.lock().await.remove(&id).is_some()
    }

    /// Drain every in-flight request with a uniform termination failure.
    /// The pending set is empty afterwards.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            warn!("Failing {} in-flight request(s): channel closed", pending.len());
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(EngineReply::Terminated);
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}
