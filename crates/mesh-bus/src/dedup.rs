//! # Dedup Window
//!
//! Bounded memory of recently processed message ids. Guarantees idempotent
//! handling under at-least-once delivery: a message may be observed more
//! than once (a record can surface as both "created" and "changed"), but a
//! handler invocation happens once per id as perceived by subscribers.

use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Default bound on the window.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// FIFO-bounded set of recently processed message ids.
///
/// Eviction is by insertion order, not recency of access: the simplest
/// correct shape for a small cyclic buffer. The window is process-local;
/// consumer processes do not share it.
pub struct DedupWindow {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl DedupWindow {
    /// Create a window with [`DEFAULT_DEDUP_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }

    /// Create a window bounded at `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether `id` is recorded in the window.
    #[must_use]
    pub fn seen(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`, evicting the oldest insertion once over capacity.
    /// Re-marking an already-seen id is a no-op.
    pub fn mark_seen(&mut self, id: Uuid) {
        if !self.seen.insert(id) {
            return;
        }
        self.order.push_back(id);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    /// Number of ids currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The configured bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}
