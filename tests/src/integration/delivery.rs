//! End-to-end delivery flows over a single in-memory bus: direct delivery,
//! queue fallback, broadcast addressing, and registry liveness.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{bus, collector, registration, signer};
    use mesh_bus::{handler_fn, BusError, HandlerError, RegistryEvent};
    use mesh_types::{AgentStatus, Capability, Recipient};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_registered_subscriber_gets_signed_message() {
        let bus = bus();
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["echo"]))
            .unwrap();

        let (received, handler) = collector();
        bus.subscribe(&"agent.b".into(), handler).unwrap();

        let receipt = bus
            .send(
                &"agent.a".into(),
                Recipient::agent("agent.b"),
                "echo",
                json!({"text": "hi"}),
            )
            .await
            .unwrap();
        assert!(receipt.delivered);

        let messages = received.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload["text"], json!("hi"));
        assert_eq!(messages[0].sender.as_str(), "agent.a");
        // The delivered envelope carries a signature the shared key accepts.
        assert!(signer().verify(&messages[0]));
    }

    #[tokio::test]
    async fn test_send_before_subscribe_arrives_after() {
        let bus = bus();
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["echo"]))
            .unwrap();
        bus.spawn_consumer().await;

        // Nobody is listening yet: the message is queued, not lost.
        let receipt = bus
            .send(
                &"agent.a".into(),
                Recipient::agent("agent.b"),
                "echo",
                json!({"n": 1}),
            )
            .await
            .unwrap();
        assert!(!receipt.delivered);

        let (received, handler) = collector();
        bus.subscribe(&"agent.b".into(), handler).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while received.lock().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let messages = received.lock();
        assert_eq!(messages.len(), 1, "queued message should arrive exactly once");
        assert_eq!(messages[0].id, receipt.message_id);

        drop(messages);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_but_sender() {
        let bus = bus();
        for id in ["agent.a", "agent.b", "agent.c"] {
            bus.register_agent(registration(id, &["echo"])).unwrap();
        }
        let (a_msgs, a_handler) = collector();
        let (b_msgs, b_handler) = collector();
        let (c_msgs, c_handler) = collector();
        bus.subscribe(&"agent.a".into(), a_handler).unwrap();
        bus.subscribe(&"agent.b".into(), b_handler).unwrap();
        bus.subscribe(&"agent.c".into(), c_handler).unwrap();

        bus.send(
            &"agent.a".into(),
            Recipient::Broadcast,
            "announce",
            json!({"v": 2}),
        )
        .await
        .unwrap();

        assert!(a_msgs.lock().is_empty(), "sender must not hear its own broadcast");
        assert_eq!(b_msgs.lock().len(), 1);
        assert_eq!(c_msgs.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_one_bad_subscriber_does_not_starve_the_rest() {
        let bus = bus();
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["echo"]))
            .unwrap();

        bus.subscribe(
            &"agent.b".into(),
            handler_fn(|_msg| async { Err(HandlerError::new("kaboom")) }),
        )
        .unwrap();
        let (received, handler) = collector();
        bus.subscribe(&"agent.b".into(), handler).unwrap();

        let receipt = bus
            .send(
                &"agent.a".into(),
                Recipient::agent("agent.b"),
                "echo",
                json!(null),
            )
            .await
            .unwrap();

        assert!(receipt.delivered);
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_sender_rejected() {
        let bus = bus();
        let err = bus
            .send(&"ghost".into(), Recipient::Broadcast, "echo", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Validation(_)));
    }

    #[tokio::test]
    async fn test_capability_lookup_excludes_requester() {
        let bus = bus();
        bus.register_agent(registration("agent.a", &["review", "echo"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["review"]))
            .unwrap();
        bus.register_agent(registration("agent.c", &["echo"]))
            .unwrap();

        let reviewers = bus.find_by_capability(&Capability::from("review"), &"agent.a".into());
        assert_eq!(reviewers, vec!["agent.b".into()]);
    }

    #[tokio::test]
    async fn test_registry_events_observed() {
        let bus = bus();
        let mut events = bus.registry_events();

        bus.register_agent(registration("agent.a", &["echo"]))
            .unwrap();
        bus.update_agent_status(&"agent.a".into(), AgentStatus::Busy);
        bus.unregister_agent(&"agent.a".into());

        assert!(matches!(
            events.recv().await.unwrap(),
            RegistryEvent::Registered { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            RegistryEvent::StatusChanged {
                status: AgentStatus::Busy,
                ..
            }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            RegistryEvent::Unregistered { .. }
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_message_never_delivered() {
        use mesh_bus::{BusConfig, InMemoryMessageStore, MessageBus, MessageStore};
        use mesh_crypto::{MessageSigner, SecretKey};
        use mesh_types::AgentMessage;

        let store = Arc::new(InMemoryMessageStore::new());
        let bus = MessageBus::new(
            MessageSigner::new(SecretKey::from_bytes([1u8; 32])),
            store.clone(),
            BusConfig {
                poll_interval: Duration::from_millis(20),
                ..BusConfig::default()
            },
        );
        bus.register_agent(registration("agent.b", &["echo"]))
            .unwrap();
        let (received, handler) = collector();
        bus.subscribe(&"agent.b".into(), handler).unwrap();
        bus.spawn_consumer().await;

        // Forge a message signed with a different key and inject it
        // directly into the queue.
        let intruder = MessageSigner::new(SecretKey::from_bytes([2u8; 32]));
        let mut forged = AgentMessage::new(
            "agent.a",
            Recipient::agent("agent.b"),
            "echo",
            json!({"evil": true}),
            0,
        );
        intruder.attach(&mut forged).unwrap();
        store.put(&forged).await.unwrap();

        // The consumer drops it: queue empties, nothing is delivered.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while !store.list().await.unwrap().is_empty()
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(store.list().await.unwrap().is_empty());
        assert!(received.lock().is_empty());
        bus.shutdown().await;
    }
}
