//! # Request/Response Flows
//!
//! Drives the bridge against an in-memory bus with the test playing the
//! external responder: it reads commands off `cmd` and injects responses on
//! `resp` by hand.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::{json, Value};
    use shared_bus::{BusClient, InMemoryEventBus, Topic};
    use std::sync::Arc;
    use std::time::Duration;
    use sync_bridge::adapter::wire::{decode_command, encode_response};
    use sync_bridge::{Bridge, BridgeConfig, BridgeError, CorrelationId, CorrelationMode};
    use tokio::time::timeout;

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn config(request_timeout: Duration) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.bus.command_topic = "cmd".into();
        config.bus.response_topic = "resp".into();
        config.timeouts.request = request_timeout;
        config
    }

    fn setup(request_timeout: Duration) -> (Arc<InMemoryEventBus>, Arc<Bridge>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = Arc::new(Bridge::new(bus.clone(), &config(request_timeout)).unwrap());
        (bus, bridge)
    }

    async fn inject(bus: &InMemoryEventBus, id: &str, body: Value) {
        let payload = encode_response(&CorrelationId::from(id), &body).unwrap();
        bus.publish(&Topic::new("resp"), id, payload).await.unwrap();
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    /// Command `{id: "abc", body: "hello"}` goes out on `cmd`; the injected
    /// `{id: "abc", body: "HELLO"}` on `resp` comes back to the caller.
    #[tokio::test]
    async fn test_abc_hello_scenario() {
        let (bus, bridge) = setup(Duration::from_secs(2));
        let mut commands = bus.subscribe_stream(&Topic::new("cmd"));

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                bridge
                    .call_with_id(CorrelationId::from("abc"), json!("hello"))
                    .await
            })
        };

        let command = timeout(Duration::from_secs(1), commands.recv())
            .await
            .expect("command should be published")
            .expect("bus open");
        assert_eq!(command.key, "abc");
        let envelope = decode_command(&command).unwrap();
        assert_eq!(envelope.id, Some(CorrelationId::from("abc")));
        assert_eq!(envelope.body, json!("hello"));

        inject(&bus, "abc", json!("HELLO")).await;

        let reply = caller.await.unwrap().unwrap();
        assert_eq!(reply.correlation_id.as_str(), "abc");
        assert_eq!(reply.body, json!("HELLO"));
        assert!(!bridge.correlator().is_pending(&CorrelationId::from("abc")));
    }

    /// Same exchange, but the response only shows up after the deadline.
    #[tokio::test(start_paused = true)]
    async fn test_abc_late_response_scenario() {
        let (bus, bridge) = setup(Duration::from_millis(500));

        let err = bridge
            .call_with_id(CorrelationId::from("abc"), json!("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref id, .. } if id.as_str() == "abc"));

        // Simulated late arrival straight into the correlator.
        assert!(!bridge
            .correlator()
            .resolve(&CorrelationId::from("abc"), json!("HELLO")));

        // And a real late event over the bus is dropped without effect.
        inject(&bus, "abc", json!("HELLO")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = bridge.correlator().snapshot();
        assert_eq!(snapshot.pending, 0);
        assert_eq!(snapshot.resolved, 0);
        assert_eq!(snapshot.timed_out, 1);
        assert_eq!(snapshot.unmatched, 2);
    }

    /// A late response for one caller never lands on the next caller.
    #[tokio::test(start_paused = true)]
    async fn test_late_response_not_delivered_elsewhere() {
        let (bus, bridge) = setup(Duration::from_millis(200));
        let mut commands = bus.subscribe_stream(&Topic::new("cmd"));

        let first = bridge.call(json!("first")).await.unwrap_err();
        let BridgeError::Timeout { id: stale, .. } = first else {
            panic!("expected timeout");
        };
        let _ = commands.try_recv();

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(json!("second")).await })
        };
        let command = timeout(Duration::from_secs(1), commands.recv())
            .await
            .unwrap()
            .unwrap();
        let fresh = decode_command(&command).unwrap().id.unwrap();
        assert_ne!(fresh, stale);

        inject(&bus, stale.as_str(), json!("STALE")).await;
        inject(&bus, fresh.as_str(), json!("SECOND")).await;

        let reply = caller.await.unwrap().unwrap();
        assert_eq!(reply.body, json!("SECOND"));
    }

    /// With a fixed key the ids cannot tell callers apart: a reply that
    /// arrives after its caller gave up is taken by whoever holds the key next.
    #[tokio::test(start_paused = true)]
    async fn test_fixed_key_late_reply_reaches_next_caller() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut config = config(Duration::from_millis(200));
        config.correlation.mode = CorrelationMode::FixedKey;
        let bridge = Arc::new(Bridge::new(bus.clone(), &config).unwrap());
        let mut commands = bus.subscribe_stream(&Topic::new("cmd"));

        let first = bridge.call(json!("first")).await.unwrap_err();
        assert!(matches!(first, BridgeError::Timeout { ref id, .. } if id.as_str() == "myKey"));
        let _ = commands.try_recv();

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(json!("second")).await })
        };
        let command = timeout(Duration::from_secs(1), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode_command(&command).unwrap().body, json!("second"));

        // The reply meant for "first" shows up now.
        inject(&bus, "myKey", json!("FIRST")).await;

        let reply = caller.await.unwrap().unwrap();
        assert_eq!(reply.correlation_id.as_str(), "myKey");
        assert_eq!(reply.body, json!("FIRST"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_has_no_effect() {
        let (_bus, bridge) = setup(Duration::from_secs(1));
        let correlator = bridge.correlator();

        let _waiting = correlator.register(CorrelationId::from("known")).unwrap();
        let before = correlator.pending_count();

        assert!(!correlator.resolve(&CorrelationId::from("unknown"), json!(1)));

        assert_eq!(correlator.pending_count(), before);
        assert!(correlator.is_pending(&CorrelationId::from("known")));
        assert_eq!(correlator.snapshot().resolved, 0);
    }

    /// Responders that publish bare text under the correlation key are
    /// matched through the event key.
    #[tokio::test]
    async fn test_bare_text_response_matched_by_key() {
        let (bus, bridge) = setup(Duration::from_secs(2));
        let mut commands = bus.subscribe_stream(&Topic::new("cmd"));

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(json!("hello")).await })
        };

        let command = timeout(Duration::from_secs(1), commands.recv())
            .await
            .unwrap()
            .unwrap();
        bus.publish(&Topic::new("resp"), &command.key, Bytes::from_static(b"HELLO"))
            .await
            .unwrap();

        let reply = caller.await.unwrap().unwrap();
        assert_eq!(reply.body, json!("HELLO"));
    }

    #[tokio::test]
    async fn test_malformed_response_does_not_break_bridge() {
        let (bus, bridge) = setup(Duration::from_secs(2));
        let mut commands = bus.subscribe_stream(&Topic::new("cmd"));

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(json!("hello")).await })
        };
        let command = timeout(Duration::from_secs(1), commands.recv())
            .await
            .unwrap()
            .unwrap();

        // Undecodable, then unkeyed, then the real answer.
        bus.publish(&Topic::new("resp"), "", Bytes::from_static(&[0xff, 0x00]))
            .await
            .unwrap();
        bus.publish(&Topic::new("resp"), "", Bytes::from_static(br#"{"body":1}"#))
            .await
            .unwrap();
        inject(&bus, &command.key, json!("HELLO")).await;

        let reply = caller.await.unwrap().unwrap();
        assert_eq!(reply.body, json!("HELLO"));
        assert!(bridge.is_ready());
    }
}
