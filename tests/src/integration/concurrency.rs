//! # Concurrency
//!
//! Many callers in flight against one bridge: every caller gets its own
//! response, the response subscription exists once, and fixed-key mode runs
//! callers one at a time.

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use rand::Rng;
    use serde_json::{json, Value};
    use shared_bus::{BusClient, BusEvent, EventHandler, InMemoryEventBus, SubscriptionHandle};
    use std::sync::Arc;
    use std::time::Duration;
    use sync_bridge::adapter::wire::{decode_command, encode_response};
    use sync_bridge::testing::{spawn_responder, FlakyBus};
    use sync_bridge::{Bridge, BridgeConfig, CorrelationMode};

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.timeouts.request = Duration::from_secs(5);
        config
    }

    /// Responder answering `{"echo": body}` after a random delay, so replies
    /// come back out of order.
    async fn spawn_shuffling_responder(
        bus: Arc<InMemoryEventBus>,
        config: &BridgeConfig,
    ) -> SubscriptionHandle {
        let response_topic = config.response_topic();
        let publisher = Arc::clone(&bus);
        let handler: EventHandler = Arc::new(move |event: BusEvent| {
            let envelope = decode_command(&event).unwrap();
            let id = envelope.id.unwrap();
            let payload = encode_response(&id, &json!({ "echo": envelope.body })).unwrap();
            let delay = Duration::from_millis(rand::thread_rng().gen_range(0..30));
            let bus = Arc::clone(&publisher);
            let topic = response_topic.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                bus.publish(&topic, id.as_str(), payload).await.unwrap();
            });
        });
        bus.subscribe(&config.command_topic(), handler).await.unwrap()
    }

    /// N concurrent callers with distinct payloads each receive only their
    /// own payload back.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_cross_talk() {
        const N: usize = 100;

        let bus = Arc::new(InMemoryEventBus::new());
        let config = config();
        let bridge = Arc::new(Bridge::new(bus.clone(), &config).unwrap());
        let _responder = spawn_shuffling_responder(bus.clone(), &config).await;

        let calls = (0..N).map(|i| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let reply = bridge.call(json!(format!("request-{i}"))).await.unwrap();
                (i, reply)
            })
        });

        let mut ids = std::collections::HashSet::new();
        for result in join_all(calls).await {
            let (i, reply) = result.unwrap();
            assert_eq!(reply.body, json!({ "echo": format!("request-{i}") }));
            assert!(ids.insert(reply.correlation_id));
        }

        let snapshot = bridge.correlator().snapshot();
        assert_eq!(snapshot.pending, 0);
        assert_eq!(snapshot.resolved, N as u64);
        assert_eq!(snapshot.unmatched, 0);
    }

    /// Concurrent establishment at startup yields exactly one handler, and
    /// each response event is delivered once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscription_established_once() {
        let bus = Arc::new(FlakyBus::new());
        let config = config();
        let bridge = Arc::new(Bridge::new(bus.clone(), &config).unwrap());

        let attempts = (0..16).map(|_| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.ensure_subscribed().await })
        });
        for result in join_all(attempts).await {
            result.unwrap().unwrap();
        }

        assert_eq!(bus.subscribe_calls(), 1);
        assert_eq!(bus.inner().subscriber_count(&config.response_topic()), 1);

        // One event, one delivery: a second handler would show as unmatched.
        let _responder = spawn_responder(
            bus.clone(),
            &config.command_topic(),
            &config.response_topic(),
            Some,
        )
        .await;
        let reply = bridge.call(json!("once")).await.unwrap();
        assert_eq!(reply.body, json!("once"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = bridge.correlator().snapshot();
        assert_eq!(snapshot.resolved, 1);
        assert_eq!(snapshot.unmatched, 0);
    }

    /// With a responder that only echoes a fixed key, callers are
    /// serialized and still get their own answers. Overlap would surface as
    /// a duplicate registration.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fixed_key_mode_serializes_callers() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut config = config();
        config.correlation.mode = CorrelationMode::FixedKey;
        config.correlation.fixed_key = "myKey".into();
        let bridge = Arc::new(Bridge::new(bus.clone(), &config).unwrap());

        let _responder = spawn_responder(
            bus.clone(),
            &config.command_topic(),
            &config.response_topic(),
            |body: Value| body.as_str().map(|s| json!(s.to_uppercase())),
        )
        .await;

        let calls = (0..10).map(|i| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { (i, bridge.call(json!(format!("msg-{i}"))).await) })
        });

        for result in join_all(calls).await {
            let (i, reply) = result.unwrap();
            let reply = reply.unwrap();
            assert_eq!(reply.correlation_id.as_str(), "myKey");
            assert_eq!(reply.body, json!(format!("MSG-{i}")));
        }
        // Overlapping callers would have collided on the key.
        assert_eq!(bridge.correlator().snapshot().registered, 10);
        assert_eq!(bridge.correlator().pending_count(), 0);
    }

    /// A caller abandoned mid-wait leaves nothing behind in the waiter table.
    #[tokio::test]
    async fn test_abandoned_caller_is_cleaned_up() {
        let bus = Arc::new(InMemoryEventBus::new());
        let bridge = Arc::new(Bridge::new(bus.clone(), &config()).unwrap());

        let caller = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call(json!("never answered")).await })
        };

        tokio::time::timeout(Duration::from_secs(1), async {
            while bridge.correlator().pending_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("caller should register");

        caller.abort();
        let _ = caller.await;

        assert_eq!(bridge.correlator().pending_count(), 0);
        assert_eq!(bridge.correlator().snapshot().cancelled, 1);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = Arc::new(InMemoryEventBus::new());
        let config = config();
        let bridge = Bridge::new(bus.clone(), &config).unwrap();
        bridge.ensure_subscribed().await.unwrap();

        // Responses published on the command topic are not seen as responses.
        let _pending = bridge
            .correlator()
            .register(sync_bridge::CorrelationId::from("abc"))
            .unwrap();
        bus.publish(
            &config.command_topic(),
            "abc",
            encode_response(&"abc".into(), &json!("WRONG TOPIC")).unwrap(),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(bridge
            .correlator()
            .is_pending(&sync_bridge::CorrelationId::from("abc")));
    }
}
