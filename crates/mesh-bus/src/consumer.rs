//! # Consumer Loop
//!
//! Background task that drains the persisted message queue. Runs one scan
//! per poll tick and one per store-change notification, verifying each
//! record's signature, suppressing duplicates, and re-entering the same
//! router used by the direct send path.
//!
//! Records with no matching subscriber are left queued for a later scan;
//! that is the fallback that lets a message sent before `subscribe` still
//! arrive afterwards.

use crate::bus::dispatch;
use crate::dedup::DedupWindow;
use crate::pending::PendingRequestTable;
use crate::ports::SharedStore;
use crate::router::Router;
use mesh_crypto::MessageSigner;
use mesh_types::{AgentMessage, DeliveryStatus, Recipient};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The draining side of a [`crate::MessageBus`].
pub struct ConsumerLoop {
    store: SharedStore,
    signer: Arc<MessageSigner>,
    router: Arc<Router>,
    pending: Arc<PendingRequestTable>,
    dedup: Mutex<DedupWindow>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
}

/// Handle to a spawned [`ConsumerLoop`].
pub struct ConsumerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal the loop to stop after its current scan.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Stop the loop and wait for it to finish.
    pub async fn stopped(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "consumer task did not shut down cleanly");
        }
    }
}

impl ConsumerLoop {
    pub(crate) fn new(
        store: SharedStore,
        signer: Arc<MessageSigner>,
        router: Arc<Router>,
        pending: Arc<PendingRequestTable>,
        dedup_capacity: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            router,
            pending,
            dedup: Mutex::new(DedupWindow::with_capacity(dedup_capacity)),
            poll_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Spawn the loop onto the current runtime.
    pub(crate) fn spawn(self) -> ConsumerHandle {
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(self.run());
        ConsumerHandle { shutdown, task }
    }

    async fn run(self) {
        info!(poll_interval = ?self.poll_interval, "consumer loop started");

        let mut watch = self.store.watch();
        let mut watch_open = true;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    info!("consumer loop stopping");
                    return;
                }
                _ = ticker.tick() => {}
                changed = watch.recv(), if watch_open => {
                    match changed {
                        Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            // Store dropped its sender; the poll tick still
                            // drives the loop.
                            watch_open = false;
                            continue;
                        }
                    }
                }
            }

            self.drain().await;
        }
    }

    /// One full scan of the queue.
    async fn drain(&self) {
        let records = match self.store.list().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "could not scan message queue");
                return;
            }
        };

        for message in records {
            self.process(message).await;
        }
    }

    async fn process(&self, mut message: AgentMessage) {
        if !self.signer.verify(&message) {
            warn!(id = %message.id, sender = %message.sender, "dropping message with invalid signature");
            self.discard(&message).await;
            return;
        }

        let duplicate = self.dedup.lock().seen(&message.id);
        if duplicate {
            debug!(id = %message.id, "dropping already-processed message");
            self.discard(&message).await;
            return;
        }

        // Leave records this process cannot route untouched; the subscriber
        // may live in another consumer process sharing the queue, and
        // rewriting the record here would race with that consumer's delete.
        if !self.can_route(&message) {
            return;
        }

        message.status = DeliveryStatus::Processing;
        if let Err(e) = self.store.put(&message).await {
            // Leave the record as-is; the next scan retries.
            warn!(id = %message.id, error = %e, "could not mark message processing");
            return;
        }

        let result = dispatch(&self.router, &self.pending, &message).await;

        if !result.delivered && result.handlers_invoked == 0 {
            // The subscriber vanished between the routability check and
            // dispatch. Re-queue and try again on a later scan.
            message.status = DeliveryStatus::Pending;
            if let Err(e) = self.store.put(&message).await {
                warn!(id = %message.id, error = %e, "could not re-queue undelivered message");
            }
            return;
        }

        // Invoked (or resolved a pending request): this message is done,
        // even if every callback failed. Faults are contained, not retried.
        self.dedup.lock().mark_seen(message.id);
        message.status = DeliveryStatus::Processed;
        if let Err(e) = self.store.put(&message).await {
            warn!(id = %message.id, error = %e, "could not mark message processed");
        }
        self.discard(&message).await;

        debug!(
            id = %message.id,
            action = %message.action,
            delivered = result.delivered,
            handlers = result.handlers_invoked,
            "queued message processed"
        );
    }

    /// Whether this process has a target for the message: an outstanding
    /// request it would resolve, or a live local subscriber.
    fn can_route(&self, message: &AgentMessage) -> bool {
        if let Some(request_id) = message.response_request_id() {
            if self.pending.contains(&request_id) {
                return true;
            }
        }
        match &message.recipient {
            Recipient::Broadcast => self.router.has_other_subscribers(&message.sender),
            Recipient::Agent(agent) => self.router.has_subscribers(agent),
        }
    }

    async fn discard(&self, message: &AgentMessage) {
        if let Err(e) = self.store.delete(&message.id).await {
            warn!(id = %message.id, error = %e, "could not remove message record");
        }
    }
}
