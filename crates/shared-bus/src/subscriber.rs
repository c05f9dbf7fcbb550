//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: a pull-style
//! [`Subscription`] and the push-style [`SubscriptionHandle`] that owns a
//! delivery task invoking an [`EventHandler`].

use crate::events::{BusEvent, Topic};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked once per delivered event.
///
/// Runs on the subscription's delivery task, shared by every request waiting
/// on that topic; it must not block.
pub type EventHandler = Arc<dyn Fn(BusEvent) + Send + Sync>;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// A pull-style subscription to one topic.
///
/// The underlying receiver is attached when the subscription is created, so
/// every event published after construction is observed.
pub struct Subscription {
    receiver: broadcast::Receiver<BusEvent>,
    topic: Topic,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<BusEvent>, topic: Topic) -> Self {
        Self { receiver, topic }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(topic = %self.topic, lagged = count, "Subscriber lagged, events dropped");
                }
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// - `Ok(Some(event))` - an event was available
    /// - `Ok(None)` - nothing available right now
    /// - `Err(SubscriptionError::Closed)` - the bus was closed
    pub fn try_recv(&mut self) -> Result<Option<BusEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Handle to a standing, push-style subscription.
///
/// The delivery task stops on [`unsubscribe`](Self::unsubscribe) or when the
/// handle is dropped.
pub struct SubscriptionHandle {
    topic: Topic,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Wrap a running delivery task.
    pub fn new(topic: Topic, task: JoinHandle<()>) -> Self {
        Self { topic, task }
    }

    /// Topic this handle delivers from.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Whether the delivery task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop delivering events. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.task.is_finished() {
            debug!(topic = %self.topic, "Unsubscribing");
        }
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drive `subscription` on a background task, invoking `handler` per event.
pub fn spawn_handler(mut subscription: Subscription, handler: EventHandler) -> SubscriptionHandle {
    let topic = subscription.topic().clone();
    let task_topic = topic.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            handler(event);
        }
        debug!(topic = %task_topic, "Delivery loop ended (bus closed)");
    });
    SubscriptionHandle::new(topic, task)
}
