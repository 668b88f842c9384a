//! # Outbound Ports
//!
//! Abstractions over the environment: wall-clock time and the persisted
//! message queue. The bus core talks to these traits only; tests and
//! embedders swap implementations without touching delivery logic.

use async_trait::async_trait;
use mesh_types::AgentMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Capacity of the store-change notification channel. A lagging consumer
/// only misses wake-ups, never data; the poll tick covers the gap.
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Production clock backed by [`std::time::SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Failures from the persisted message queue.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed (disk full, permissions, transient fs error).
    #[error("message store I/O failed: {message}")]
    Io { message: String },

    /// A persisted record could not be decoded.
    #[error("corrupt message record: {message}")]
    Corrupt { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

/// Persisted message queue keyed by message id.
///
/// `put` overwrites an existing record with the same id, which is how
/// status transitions are recorded. `watch` yields the id of every record
/// written, waking consumers ahead of their poll tick.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn put(&self, message: &AgentMessage) -> Result<(), StoreError>;

    /// All persisted records, ordered by `(timestamp, id)` so replay is
    /// deterministic.
    async fn list(&self) -> Result<Vec<AgentMessage>, StoreError>;

    /// Remove a record. Deleting an absent id is not an error.
    async fn delete(&self, id: &Uuid) -> Result<(), StoreError>;

    fn watch(&self) -> broadcast::Receiver<Uuid>;
}

/// Volatile store for tests and single-process embedding.
pub struct InMemoryMessageStore {
    records: Mutex<HashMap<Uuid, AgentMessage>>,
    notify: broadcast::Sender<Uuid>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            records: Mutex::new(HashMap::new()),
            notify,
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn put(&self, message: &AgentMessage) -> Result<(), StoreError> {
        self.records.lock().insert(message.id, message.clone());
        let _ = self.notify.send(message.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AgentMessage>, StoreError> {
        let mut records: Vec<AgentMessage> = self.records.lock().values().cloned().collect();
        records.sort_by_key(|m| (m.timestamp, m.id));
        Ok(records)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        self.records.lock().remove(id);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<Uuid> {
        self.notify.subscribe()
    }
}

/// Durable store: one JSON file per message in a shared directory.
///
/// Multiple processes may point at the same directory; writes go through a
/// temp file followed by a rename so readers never observe a half-written
/// record.
pub struct FileMessageStore {
    dir: PathBuf,
    notify: broadcast::Sender<Uuid>,
}

impl FileMessageStore {
    /// Open (creating if needed) the queue directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let (notify, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Ok(Self { dir, notify })
    }

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_record(path: &Path) -> Result<AgentMessage, StoreError> {
        let raw = tokio::fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
            message: format!("{}: {e}", path.display()),
        })
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn put(&self, message: &AgentMessage) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(message).map_err(|e| StoreError::Corrupt {
            message: e.to_string(),
        })?;

        // Unique temp name per writer so concurrent producers never clobber
        // each other's in-flight write.
        let tmp = self.dir.join(format!("{}.{}.tmp", message.id, Uuid::new_v4()));
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, self.record_path(&message.id)).await?;

        let _ = self.notify.send(message.id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AgentMessage>, StoreError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(message) => records.push(message),
                Err(e) => {
                    // One bad record must not wedge the whole queue.
                    warn!(path = %path.display(), error = %e, "skipping unreadable message record");
                }
            }
        }

        records.sort_by_key(|m| (m.timestamp, m.id));
        Ok(records)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            // Another consumer got there first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn watch(&self) -> broadcast::Receiver<Uuid> {
        self.notify.subscribe()
    }
}

/// Convenience alias used throughout the bus.
pub type SharedStore = Arc<dyn MessageStore>;
