//! # Message Bus
//!
//! Composition root wiring the signer, registry, router, pending-request
//! table, and persisted queue into one facade. `send` tries immediate
//! in-process delivery and falls back to the queue; the consumer loop
//! drains the queue through the very same dispatch path.

use crate::config::BusConfig;
use crate::consumer::{ConsumerHandle, ConsumerLoop};
use crate::errors::BusError;
use crate::pending::{PendingRequestTable, PendingResponse};
use crate::ports::{InMemoryMessageStore, SharedStore, SystemTimeSource, TimeSource};
use crate::registry::{AgentRecord, AgentRegistry, RegistryEvent};
use crate::router::{DeliveryResult, MessageHandler, Router};
use mesh_crypto::MessageSigner;
use mesh_types::{
    AgentId, AgentMessage, AgentRegistration, AgentStatus, Capability, Recipient, ValidationError,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Uuid,
    /// `true` when at least one subscriber callback took the message
    /// immediately; `false` when the message was queued for later pickup.
    pub delivered: bool,
}

/// Route one verified message: resolve a pending request if it is the
/// response half of one, otherwise hand it to subscriber callbacks.
///
/// Shared by the direct send path and the consumer loop so both honor the
/// same broadcast and correlation rules.
pub(crate) async fn dispatch(
    router: &Router,
    pending: &PendingRequestTable,
    message: &AgentMessage,
) -> DeliveryResult {
    if let Some(request_id) = message.response_request_id() {
        if pending.resolve(&request_id, message.payload.clone()) {
            debug!(id = %message.id, %request_id, "response resolved pending request");
            return DeliveryResult {
                delivered: true,
                handlers_invoked: 0,
            };
        }
        // Unknown request id: fall through so a plain subscriber can still
        // observe the response message.
    }

    router.deliver(message).await
}

/// The agent messaging substrate.
///
/// Broker-less: every embedding process builds its own bus over a shared
/// secret and (optionally) a shared queue directory.
pub struct MessageBus {
    signer: Arc<MessageSigner>,
    registry: Arc<AgentRegistry>,
    router: Arc<Router>,
    pending: Arc<PendingRequestTable>,
    store: SharedStore,
    time: Arc<dyn TimeSource>,
    config: BusConfig,
    consumer: Mutex<Option<ConsumerHandle>>,
}

impl MessageBus {
    pub fn new(signer: MessageSigner, store: SharedStore, config: BusConfig) -> Self {
        Self::with_time_source(signer, store, config, Arc::new(SystemTimeSource))
    }

    /// Construct with an explicit clock. Tests use this to drive liveness
    /// checks deterministically.
    pub fn with_time_source(
        signer: MessageSigner,
        store: SharedStore,
        config: BusConfig,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            signer: Arc::new(signer),
            registry: Arc::new(AgentRegistry::new(
                config.liveness_timeout,
                Arc::clone(&time),
            )),
            router: Arc::new(Router::new()),
            pending: Arc::new(PendingRequestTable::new(config.max_pending_requests)),
            store,
            time,
            config,
            consumer: Mutex::new(None),
        }
    }

    /// A fully volatile bus for tests and single-process embedding.
    #[must_use]
    pub fn in_memory(signer: MessageSigner) -> Self {
        Self::new(
            signer,
            Arc::new(InMemoryMessageStore::new()),
            BusConfig::default(),
        )
    }

    /// Announce an agent to the mesh.
    ///
    /// Re-registering an existing id overwrites its record.
    ///
    /// # Errors
    ///
    /// Rejects registrations with an empty id, empty name, or no
    /// capabilities.
    pub fn register_agent(&self, registration: AgentRegistration) -> Result<(), BusError> {
        self.registry.register(registration)?;
        Ok(())
    }

    /// Remove an agent and all of its subscriptions.
    pub fn unregister_agent(&self, agent: &AgentId) -> bool {
        self.router.unsubscribe(agent);
        self.registry.unregister(agent)
    }

    pub fn get_agent(&self, agent: &AgentId) -> Option<AgentRecord> {
        self.registry.get(agent)
    }

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.registry.list_all()
    }

    pub fn update_agent_status(&self, agent: &AgentId, status: AgentStatus) -> bool {
        self.registry.update_status(agent, status)
    }

    pub fn heartbeat(&self, agent: &AgentId) -> bool {
        self.registry.heartbeat(agent)
    }

    /// Mark agents silent past the liveness threshold as disconnected and
    /// return the ones newly marked.
    pub fn check_health(&self) -> Vec<AgentId> {
        self.registry.check_health()
    }

    /// Connected agents advertising `capability`, excluding `requester`.
    pub fn find_by_capability(&self, capability: &Capability, requester: &AgentId) -> Vec<AgentId> {
        self.registry.find_by_capability(capability, requester)
    }

    /// Watch registry lifecycle events (register, unregister, status change).
    pub fn registry_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.subscribe_events()
    }

    /// Attach a callback for messages addressed to `agent` (including
    /// broadcasts from others).
    ///
    /// # Errors
    ///
    /// The agent must be registered first.
    pub fn subscribe(
        &self,
        agent: &AgentId,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BusError> {
        if !self.registry.is_registered(agent) {
            return Err(ValidationError::NotRegistered {
                agent: agent.clone(),
            }
            .into());
        }
        self.router.subscribe(agent.clone(), handler);
        Ok(())
    }

    /// Drop all callbacks for an agent. Returns `false` if it had none.
    pub fn unsubscribe(&self, agent: &AgentId) -> bool {
        self.router.unsubscribe(agent)
    }

    /// Sign and deliver a message.
    ///
    /// Immediate delivery when a subscriber is live; otherwise the signed
    /// message is queued and the receipt reports `delivered: false`.
    ///
    /// # Errors
    ///
    /// Fails on an unregistered sender, an empty action, a signing failure,
    /// or a queue write failure after a delivery miss.
    pub async fn send(
        &self,
        sender: &AgentId,
        recipient: Recipient,
        action: &str,
        payload: Value,
    ) -> Result<SendReceipt, BusError> {
        self.send_with_id(Uuid::new_v4(), sender, recipient, action, payload)
            .await
    }

    async fn send_with_id(
        &self,
        id: Uuid,
        sender: &AgentId,
        recipient: Recipient,
        action: &str,
        payload: Value,
    ) -> Result<SendReceipt, BusError> {
        if !self.registry.is_registered(sender) {
            return Err(ValidationError::NotRegistered {
                agent: sender.clone(),
            }
            .into());
        }
        if action.is_empty() {
            return Err(ValidationError::EmptyAction.into());
        }

        let mut message =
            AgentMessage::with_id(id, sender.clone(), recipient, action, payload, self.time.now_ms());
        self.signer
            .attach(&mut message)
            .map_err(|source| BusError::Signing {
                message_id: message.id,
                source,
            })?;

        // Sending counts as proof of life.
        self.registry.heartbeat(sender);

        let result = dispatch(&self.router, &self.pending, &message).await;
        if result.delivered {
            return Ok(SendReceipt {
                message_id: message.id,
                delivered: true,
            });
        }

        self.store
            .put(&message)
            .await
            .map_err(|source| BusError::Delivery {
                message_id: message.id,
                source,
            })?;
        debug!(id = %message.id, recipient = %message.recipient, "message queued for later pickup");

        Ok(SendReceipt {
            message_id: message.id,
            delivered: false,
        })
    }

    /// Send a request and obtain a handle that resolves when a response
    /// message (`<action>Response` carrying this request's id as
    /// `requestId`) arrives, or rejects at `timeout`.
    ///
    /// The request's message id doubles as the correlation id and is
    /// mirrored into the outgoing payload as `requestId`.
    ///
    /// # Errors
    ///
    /// Fails like [`MessageBus::send`], plus [`BusError::Request`] when the
    /// pending table is full.
    pub async fn send_request(
        &self,
        sender: &AgentId,
        recipient: AgentId,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<PendingResponse, BusError> {
        let request_id = Uuid::new_v4();

        let mut fields = match payload {
            Value::Object(fields) => fields,
            // A non-object payload is replaced by the correlation envelope.
            _ => Map::new(),
        };
        fields.insert(
            "requestId".to_owned(),
            Value::String(request_id.to_string()),
        );

        // Register before sending: a responder on the direct path may answer
        // before send returns.
        let handle = self.pending.register(request_id, timeout)?;

        self.send_with_id(
            request_id,
            sender,
            Recipient::Agent(recipient),
            action,
            Value::Object(fields),
        )
        .await?;
        // On send failure the handle drops here and clears the table entry.

        Ok(handle)
    }

    /// Start the background consumer draining the persisted queue. A second
    /// call while one is running is a no-op.
    pub async fn spawn_consumer(&self) {
        let mut slot = self.consumer.lock().await;
        if slot.is_some() {
            return;
        }
        let consumer = ConsumerLoop::new(
            Arc::clone(&self.store),
            Arc::clone(&self.signer),
            Arc::clone(&self.router),
            Arc::clone(&self.pending),
            self.config.dedup_capacity,
            self.config.poll_interval,
        );
        *slot = Some(consumer.spawn());
    }

    /// Stop the consumer and reject every outstanding request.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.consumer.lock().await.take() {
            handle.stopped().await;
        }
        self.pending.reject_all_on_shutdown();
        info!("message bus shut down");
    }
}
