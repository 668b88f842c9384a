//! # Router
//!
//! Unicast/broadcast delivery to in-process subscriber callbacks. One
//! contract for both delivery substrates: the direct send path and the
//! persisted-queue consumer re-enter the same `deliver`, so broadcast
//! sender-exclusion holds everywhere.

use async_trait::async_trait;
use mesh_types::{AgentId, AgentMessage, Recipient};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure inside a subscriber callback.
///
/// Contained per-handler: logged by the router, never propagated to other
/// subscribers or to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("handler failed: {message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A typed subscriber callback handle.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivered message.
    async fn handle(&self, message: AgentMessage) -> Result<(), HandlerError>;
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(AgentMessage) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait]
    impl<F, Fut> MessageHandler for FnHandler<F>
    where
        F: Fn(AgentMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        async fn handle(&self, message: AgentMessage) -> Result<(), HandlerError> {
            (self.0)(message).await
        }
    }

    Arc::new(FnHandler(f))
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResult {
    /// At least one callback completed without failing.
    pub delivered: bool,
    /// Total callbacks invoked (successes and failures).
    pub handlers_invoked: usize,
}

impl DeliveryResult {
    /// No subscriber matched; nothing was invoked.
    #[must_use]
    pub fn missed() -> Self {
        Self {
            delivered: false,
            handlers_invoked: 0,
        }
    }
}

/// Per-agent ordered callback lists.
pub struct Router {
    handlers: RwLock<HashMap<AgentId, Vec<Arc<dyn MessageHandler>>>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a handler to the agent's list. Callbacks for one agent are
    /// invoked in subscription order.
    pub fn subscribe(&self, agent: AgentId, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().entry(agent).or_default().push(handler);
    }

    /// Drop all handlers for an agent. Returns `false` if none existed.
    pub fn unsubscribe(&self, agent: &AgentId) -> bool {
        self.handlers.write().remove(agent).is_some()
    }

    #[must_use]
    pub fn has_subscribers(&self, agent: &AgentId) -> bool {
        self.handlers
            .read()
            .get(agent)
            .is_some_and(|list| !list.is_empty())
    }

    /// Whether any agent other than `exclude` has handlers attached.
    #[must_use]
    pub fn has_other_subscribers(&self, exclude: &AgentId) -> bool {
        self.handlers
            .read()
            .iter()
            .any(|(agent, list)| agent != exclude && !list.is_empty())
    }

    /// Total registered handlers across all agents.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Deliver a message to in-process subscribers.
    ///
    /// Broadcast goes to every agent except the sender; unicast to the
    /// recipient's list. A failing handler is logged and the remaining
    /// handlers still run. `delivered == false` means the caller should
    /// fall back to persistence.
    pub async fn deliver(&self, message: &AgentMessage) -> DeliveryResult {
        // Clone handles out so no lock is held across await points.
        let targets: Vec<(AgentId, Vec<Arc<dyn MessageHandler>>)> = {
            let handlers = self.handlers.read();
            match &message.recipient {
                Recipient::Broadcast => handlers
                    .iter()
                    .filter(|(agent, _)| **agent != message.sender)
                    .map(|(agent, list)| (agent.clone(), list.clone()))
                    .collect(),
                Recipient::Agent(recipient) => handlers
                    .get(recipient)
                    .filter(|list| !list.is_empty())
                    .map(|list| vec![(recipient.clone(), list.clone())])
                    .unwrap_or_default(),
            }
        };

        if targets.is_empty() {
            debug!(id = %message.id, recipient = %message.recipient, "no subscriber for message");
            return DeliveryResult::missed();
        }

        let mut delivered = false;
        let mut handlers_invoked = 0;
        for (agent, handlers) in targets {
            for handler in handlers {
                handlers_invoked += 1;
                match handler.handle(message.clone()).await {
                    Ok(()) => delivered = true,
                    Err(e) => {
                        warn!(
                            id = %message.id,
                            %agent,
                            error = %e,
                            "subscriber callback failed, continuing with remaining subscribers"
                        );
                    }
                }
            }
        }

        DeliveryResult {
            delivered,
            handlers_invoked,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
