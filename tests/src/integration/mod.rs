//! Cross-crate integration scenarios.

pub mod delivery;
pub mod request_response;
pub mod shared_queue;

#[cfg(test)]
pub(crate) mod fixtures {
    use mesh_bus::{handler_fn, HandlerError, MessageBus, MessageHandler};
    use mesh_crypto::{MessageSigner, SecretKey};
    use mesh_types::{AgentMessage, AgentRegistration, Capability};
    use parking_lot::Mutex;
    use std::sync::Arc;

    pub const TEST_KEY: [u8; 32] = [42u8; 32];

    pub fn signer() -> MessageSigner {
        MessageSigner::new(SecretKey::from_bytes(TEST_KEY))
    }

    pub fn bus() -> MessageBus {
        MessageBus::in_memory(signer())
    }

    pub fn registration(id: &str, capabilities: &[&str]) -> AgentRegistration {
        AgentRegistration::new(
            id,
            format!("{id} test agent"),
            capabilities.iter().map(|c| Capability::from(*c)),
            "0.1.0",
        )
    }

    /// Collects every message a subscriber receives.
    pub fn collector() -> (Arc<Mutex<Vec<AgentMessage>>>, Arc<dyn MessageHandler>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler = handler_fn(move |msg| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(msg);
                Ok::<(), HandlerError>(())
            }
        });
        (received, handler)
    }
}
