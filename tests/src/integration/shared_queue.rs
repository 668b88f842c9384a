//! Two independent buses sharing one queue directory, standing in for two
//! agent processes on the same machine. No broker: the file queue plus the
//! shared secret is the whole transport.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{collector, registration, signer};
    use mesh_bus::{BusConfig, FileMessageStore, MessageBus};
    use mesh_types::Recipient;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn bus_over(dir: &std::path::Path) -> MessageBus {
        let store = Arc::new(FileMessageStore::open(dir).await.unwrap());
        MessageBus::new(
            signer(),
            store,
            BusConfig {
                poll_interval: Duration::from_millis(20),
                ..BusConfig::default()
            },
        )
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !done() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_message_crosses_process_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let sender_bus = bus_over(dir.path()).await;
        let receiver_bus = bus_over(dir.path()).await;

        sender_bus
            .register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        receiver_bus
            .register_agent(registration("agent.b", &["echo"]))
            .unwrap();
        let (received, handler) = collector();
        receiver_bus.subscribe(&"agent.b".into(), handler).unwrap();
        receiver_bus.spawn_consumer().await;

        // agent.b is not subscribed on the sender's bus, so delivery goes
        // through the shared directory.
        let receipt = sender_bus
            .send(
                &"agent.a".into(),
                Recipient::agent("agent.b"),
                "echo",
                json!({"text": "across"}),
            )
            .await
            .unwrap();
        assert!(!receipt.delivered);

        wait_until(|| !received.lock().is_empty()).await;

        let messages = received.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload["text"], json!("across"));
        assert_eq!(messages[0].id, receipt.message_id);

        drop(messages);
        receiver_bus.shutdown().await;
        sender_bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_queued_message_delivered_once_across_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let sender_bus = bus_over(dir.path()).await;
        let receiver_bus = bus_over(dir.path()).await;

        sender_bus
            .register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        receiver_bus
            .register_agent(registration("agent.b", &["echo"]))
            .unwrap();
        let (received, handler) = collector();
        receiver_bus.subscribe(&"agent.b".into(), handler).unwrap();

        // Both consumers scan the same directory.
        sender_bus.spawn_consumer().await;
        receiver_bus.spawn_consumer().await;

        sender_bus
            .send(
                &"agent.a".into(),
                Recipient::agent("agent.b"),
                "echo",
                json!({"n": 7}),
            )
            .await
            .unwrap();

        wait_until(|| !received.lock().is_empty()).await;
        // A few more scan cycles must not redeliver.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(received.lock().len(), 1);
        receiver_bus.shutdown().await;
        sender_bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_cross_process_request_response() {
        let dir = tempfile::tempdir().unwrap();
        let requester_bus = Arc::new(bus_over(dir.path()).await);
        let responder_bus = Arc::new(bus_over(dir.path()).await);

        requester_bus
            .register_agent(registration("agent.a", &["compose"]))
            .unwrap();
        responder_bus
            .register_agent(registration("agent.b", &["ping"]))
            .unwrap();

        let inner = Arc::clone(&responder_bus);
        responder_bus
            .subscribe(
                &"agent.b".into(),
                mesh_bus::handler_fn(move |msg: mesh_types::AgentMessage| {
                    let bus = Arc::clone(&inner);
                    async move {
                        bus.send(
                            &"agent.b".into(),
                            Recipient::Agent(msg.sender),
                            &mesh_types::response_action(&msg.action),
                            json!({"requestId": msg.payload["requestId"], "pong": true}),
                        )
                        .await
                        .map_err(|e| mesh_bus::HandlerError::new(e.to_string()))?;
                        Ok(())
                    }
                }),
            )
            .unwrap();

        requester_bus.spawn_consumer().await;
        responder_bus.spawn_consumer().await;

        let handle = requester_bus
            .send_request(
                &"agent.a".into(),
                "agent.b".into(),
                "ping",
                json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        // Request crosses via the directory, the response crosses back and
        // resolves the requester's pending table.
        let payload = handle.wait().await.unwrap();
        assert_eq!(payload["pong"], json!(true));

        responder_bus.shutdown().await;
        requester_bus.shutdown().await;
    }
}
