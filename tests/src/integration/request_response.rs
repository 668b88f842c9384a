//! Request/response correlation across the bus: happy path, timeout,
//! late responses, and responses arriving through the persisted queue.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{bus, registration};
    use mesh_bus::{handler_fn, HandlerError, RequestError};
    use mesh_types::{response_action, AgentMessage, Recipient};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Wire agent.b to answer `ping` with `pingResponse`, echoing the
    /// request id back in the payload.
    fn install_ping_responder(bus: &Arc<mesh_bus::MessageBus>) {
        let responder = Arc::clone(bus);
        bus.subscribe(
            &"agent.b".into(),
            handler_fn(move |msg: AgentMessage| {
                let bus = Arc::clone(&responder);
                async move {
                    let reply = json!({
                        "requestId": msg.payload["requestId"],
                        "echo": msg.payload["text"],
                    });
                    bus.send(
                        &"agent.b".into(),
                        Recipient::Agent(msg.sender),
                        &response_action(&msg.action),
                        reply,
                    )
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                    Ok(())
                }
            }),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_request_resolves_with_response_payload() {
        let bus = Arc::new(bus());
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["ping"]))
            .unwrap();
        install_ping_responder(&bus);

        let handle = bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({"text": "marco"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let payload = handle.wait().await.unwrap();
        assert_eq!(payload["echo"], json!("marco"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_when_nobody_answers() {
        let bus = bus();
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["ping"]))
            .unwrap();
        // agent.b registered but not subscribed: the request queues and no
        // response ever comes.

        let handle = bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({}),
                Duration::from_millis(100),
            )
            .await
            .unwrap();

        assert!(matches!(
            handle.wait().await.unwrap_err(),
            RequestError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_late_response_is_ignored_not_crossed() {
        let bus = Arc::new(bus());
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.register_agent(registration("agent.b", &["ping"]))
            .unwrap();

        let handle = bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({}),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        let request_id = handle.request_id();

        assert!(matches!(
            handle.wait().await.unwrap_err(),
            RequestError::Timeout { .. }
        ));

        // A response arriving after the timeout must not resolve anything
        // or be misdelivered to a later request.
        let second = bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({}),
                Duration::from_millis(20),
            )
            .await
            .unwrap();
        assert_ne!(second.request_id(), request_id);

        bus.register_agent(registration("agent.b", &["ping"]))
            .unwrap();
        bus.subscribe(&"agent.a".into(), handler_fn(|_m| async { Ok(()) }))
            .unwrap();
        bus.send(
            &"agent.b".into(),
            Recipient::agent("agent.a"),
            &response_action("ping"),
            json!({"requestId": request_id.to_string(), "stale": true}),
        )
        .await
        .unwrap();

        assert!(matches!(
            second.wait().await.unwrap_err(),
            RequestError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_response_through_queue_resolves_request() {
        use crate::integration::fixtures::signer;
        use mesh_bus::{BusConfig, InMemoryMessageStore, MessageBus, MessageStore};

        let store = Arc::new(InMemoryMessageStore::new());
        let bus = MessageBus::new(
            signer(),
            store.clone(),
            BusConfig {
                poll_interval: Duration::from_millis(20),
                ..BusConfig::default()
            },
        );
        bus.register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        bus.spawn_consumer().await;

        let handle = bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let request_id = handle.request_id();

        // Simulate a responder in another process: a signed response record
        // appears in the queue and only the consumer can route it.
        let mut response = AgentMessage::new(
            "agent.b",
            Recipient::agent("agent.a"),
            response_action("ping"),
            json!({"requestId": request_id.to_string(), "ok": true}),
            1,
        );
        signer().attach(&mut response).unwrap();
        store.put(&response).await.unwrap();

        let payload = handle.wait().await.unwrap();
        assert_eq!(payload["ok"], json!(true));
        bus.shutdown().await;
    }
}
