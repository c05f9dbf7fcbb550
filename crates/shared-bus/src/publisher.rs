//! # Bus Client
//!
//! The [`BusClient`] capability and its in-process implementation.

use crate::error::BusError;
use crate::events::{BusEvent, Topic};
use crate::subscriber::{spawn_handler, EventHandler, Subscription, SubscriptionHandle};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capability over an external publish/subscribe transport.
///
/// Implementations own connection handling, partitioning and delivery
/// guarantees; callers only publish and subscribe.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish `payload` under `key` on `topic`.
    async fn publish(&self, topic: &Topic, key: &str, payload: Bytes) -> Result<(), BusError>;

    /// Register `handler` for every event subsequently published on `topic`.
    ///
    /// Returns only once the subscription is ready: an event published after
    /// this call returns `Ok` is delivered to `handler`.
    async fn subscribe(
        &self,
        topic: &Topic,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, BusError>;
}

/// In-memory implementation of the event bus.
///
/// One `tokio::sync::broadcast` channel per topic name. Suitable for a single
/// process; networked deployments use a broker-backed client.
pub struct InMemoryEventBus {
    /// Broadcast sender per topic name.
    channels: RwLock<HashMap<String, broadcast::Sender<BusEvent>>>,

    /// Total events published.
    events_published: AtomicU64,

    /// Set once [`close`](Self::close) has been called.
    closed: AtomicBool,

    /// Per-topic channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            events_published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Attach a pull-style subscription to `topic`.
    ///
    /// The receiver exists once this returns, so it observes every event
    /// published afterwards.
    #[must_use]
    pub fn subscribe_stream(&self, topic: &Topic) -> Subscription {
        let receiver = {
            let mut channels = self
                .channels
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(topic.name().to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        debug!(topic = %topic, "New subscription created");
        Subscription::new(receiver, topic.clone())
    }

    /// Publish a fully formed event.
    ///
    /// Returns the number of subscribers that received it. Publishing to a
    /// topic nobody listens on is not an error; the event is dropped.
    pub fn publish_event(&self, event: BusEvent) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        self.events_published.fetch_add(1, Ordering::Relaxed);

        let sender = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event.topic.name())
            .cloned();

        let topic = event.topic.clone();
        let key = event.key.clone();
        match sender.map(|tx| tx.send(event)) {
            Some(Ok(receivers)) => {
                debug!(topic = %topic, key = %key, receivers, "Event published");
                Ok(receivers)
            }
            Some(Err(_)) | None => {
                warn!(topic = %topic, key = %key, "Event dropped (no receivers)");
                Ok(0)
            }
        }
    }

    /// Number of live subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic.name())
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Total events accepted for publishing.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Per-topic channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the bus: drop every channel so subscribers observe the end of
    /// their stream, and reject further publishes and subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("In-memory event bus closed");
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusClient for InMemoryEventBus {
    async fn publish(&self, topic: &Topic, key: &str, payload: Bytes) -> Result<(), BusError> {
        self.publish_event(BusEvent::new(topic.clone(), key, payload))
            .map(|_| ())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(spawn_handler(self.subscribe_stream(topic), handler))
    }
}
