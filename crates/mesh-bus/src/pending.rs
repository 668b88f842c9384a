//! # Pending Request Table
//!
//! Correlates outgoing request messages with their asynchronous responses.
//! Each registered request holds a oneshot channel; a matching response
//! resolves it, a deadline rejects it, and whichever fires first wins.
//! Dropping the caller-side handle removes the table entry, so abandoned
//! requests never accumulate.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure modes of an outstanding request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No response arrived within the deadline.
    #[error("request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The bus shut down while the request was outstanding.
    #[error("bus shut down before a response arrived")]
    Shutdown,

    /// The table is at capacity; the request was never sent.
    #[error("too many outstanding requests (limit {max})")]
    TableFull { max: usize },
}

struct Inner {
    entries: Mutex<HashMap<Uuid, oneshot::Sender<Value>>>,
}

/// Table of outstanding requests awaiting responses.
pub struct PendingRequestTable {
    inner: Arc<Inner>,
    max_entries: usize,
}

impl PendingRequestTable {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Register a request and obtain the handle that waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TableFull`] when the outstanding count has
    /// reached the configured cap.
    pub fn register(
        &self,
        request_id: Uuid,
        deadline: Duration,
    ) -> Result<PendingResponse, RequestError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut entries = self.inner.entries.lock();
            if entries.len() >= self.max_entries {
                return Err(RequestError::TableFull {
                    max: self.max_entries,
                });
            }
            entries.insert(request_id, tx);
        }

        Ok(PendingResponse {
            request_id,
            rx,
            deadline,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Complete the request matching `request_id` with a response payload.
    ///
    /// Returns `true` if an entry was resolved. Responses for unknown ids
    /// (already timed out, already resolved, or never requested) are ignored.
    pub fn resolve(&self, request_id: &Uuid, payload: Value) -> bool {
        let Some(tx) = self.inner.entries.lock().remove(request_id) else {
            warn!(%request_id, "response for unknown request id ignored");
            return false;
        };

        if tx.send(payload).is_err() {
            // Requester stopped waiting between lookup and send.
            debug!(%request_id, "requester gone before response could be handed over");
        }
        true
    }

    /// Whether a request with this id is still awaiting a response.
    #[must_use]
    pub fn contains(&self, request_id: &Uuid) -> bool {
        self.inner.entries.lock().contains_key(request_id)
    }

    /// Number of requests currently awaiting responses.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Drop every outstanding entry. Waiters observe [`RequestError::Shutdown`].
    pub fn reject_all_on_shutdown(&self) {
        let drained: Vec<Uuid> = {
            let mut entries = self.inner.entries.lock();
            let ids = entries.keys().copied().collect();
            entries.clear();
            ids
        };
        for request_id in drained {
            debug!(%request_id, "outstanding request rejected on shutdown");
        }
    }
}

/// Caller-side handle for one outstanding request.
///
/// Await [`PendingResponse::wait`] to get the response payload or a timeout.
/// Dropping the handle without waiting cancels the entry.
pub struct PendingResponse {
    request_id: Uuid,
    rx: oneshot::Receiver<Value>,
    deadline: Duration,
    inner: Arc<Inner>,
}

impl PendingResponse {
    /// The id the response payload must carry as `requestId`.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Wait for the response payload.
    ///
    /// # Errors
    ///
    /// [`RequestError::Timeout`] if the deadline passes first, or
    /// [`RequestError::Shutdown`] if the table was torn down.
    pub async fn wait(mut self) -> Result<Value, RequestError> {
        let started = tokio::time::Instant::now();
        match tokio::time::timeout(self.deadline, &mut self.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_closed)) => Err(RequestError::Shutdown),
            Err(_elapsed) => Err(RequestError::Timeout {
                elapsed: started.elapsed(),
            }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        // Late responses after a timeout (or an abandoned handle) must not
        // leave a dangling sender behind.
        self.inner.entries.lock().remove(&self.request_id);
    }
}
