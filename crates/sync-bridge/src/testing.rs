//! Test helpers shared by unit and integration tests.
//!
//! Available with the `test-utils` feature flag.

use crate::adapter::wire::{decode_command, encode_response};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use shared_bus::{
    BusClient, BusError, BusEvent, EventHandler, InMemoryEventBus, SubscriptionHandle, Topic,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// In-memory bus with injectable failures.
///
/// Subscriptions run on their own delivery task so that
/// [`sever_subscriptions`](Self::sever_subscriptions) can end them the way a
/// dropped broker connection would.
pub struct FlakyBus {
    inner: InMemoryEventBus,
    subscribe_failures: AtomicU32,
    subscribe_calls: AtomicU32,
    fail_publish: AtomicBool,
    severed: watch::Sender<u64>,
}

impl FlakyBus {
    pub fn new() -> Self {
        Self {
            inner: InMemoryEventBus::new(),
            subscribe_failures: AtomicU32::new(0),
            subscribe_calls: AtomicU32::new(0),
            fail_publish: AtomicBool::new(false),
            severed: watch::channel(0).0,
        }
    }

    /// End every subscription opened so far. Later subscriptions are healthy.
    pub fn sever_subscriptions(&self) {
        self.severed.send_modify(|generation| *generation += 1);
    }

    /// Make the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.subscribe_failures.store(n, Ordering::SeqCst);
    }

    /// Make every publish fail (or succeed again).
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Subscribe calls seen so far, failed ones included.
    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// The wrapped bus.
    pub fn inner(&self) -> &InMemoryEventBus {
        &self.inner
    }
}

#[async_trait]
impl BusClient for FlakyBus {
    async fn publish(&self, topic: &Topic, key: &str, payload: Bytes) -> Result<(), BusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.inner.publish(topic, key, payload).await
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, BusError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.subscribe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.subscribe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BusError::Subscribe {
                topic: topic.to_string(),
                reason: "injected failure".into(),
            });
        }
        if self.inner.is_closed() {
            return Err(BusError::Closed);
        }
        let mut subscription = self.inner.subscribe_stream(topic);
        let mut severed = self.severed.subscribe();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = severed.changed() => break,
                    event = subscription.recv() => match event {
                        Some(event) => handler(event),
                        None => break,
                    },
                }
            }
        });
        Ok(SubscriptionHandle::new(topic.clone(), task))
    }
}

impl Default for FlakyBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer every command on `command` with `respond(body)` on `response`.
///
/// Returning `None` from `respond` drops the command without replying.
pub async fn spawn_responder<F>(
    bus: Arc<dyn BusClient>,
    command: &Topic,
    response: &Topic,
    respond: F,
) -> SubscriptionHandle
where
    F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
{
    let publisher = Arc::clone(&bus);
    let response = response.clone();
    let handler: EventHandler = Arc::new(move |event: BusEvent| {
        let Ok(envelope) = decode_command(&event) else {
            warn!(key = %event.key, "Test responder ignored malformed command");
            return;
        };
        let (Some(id), Some(body)) = (envelope.id, respond(envelope.body)) else {
            return;
        };
        let Ok(payload) = encode_response(&id, &body) else {
            return;
        };
        let bus = Arc::clone(&publisher);
        let topic = response.clone();
        tokio::spawn(async move {
            let _ = bus.publish(&topic, id.as_str(), payload).await;
        });
    });

    match bus.subscribe(command, handler).await {
        Ok(handle) => handle,
        Err(e) => panic!("test responder could not subscribe: {e}"),
    }
}
