//! # Uppercase Responder
//!
//! Stand-in for the downstream service chain: consumes commands from the
//! command topic and answers each with its body upper-cased on the response
//! topic.
//!
//! ```text
//! Bridge ──command──→ Bus ──→ UppercaseResponder
//!                                    │
//! Bridge ←─response── Bus ←──────────┘
//! ```

use serde_json::Value;
use shared_bus::{BusClient, BusError, BusEvent, EventHandler, SubscriptionHandle, Topic};
use std::sync::Arc;
use sync_bridge::adapter::wire::{decode_command, encode_response};
use sync_bridge::CorrelationId;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Which key the responder puts on its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoKey {
    /// Echo the correlation id carried by the command
    CorrelationId,
    /// Always reply under this key, whatever the command carried
    Fixed(CorrelationId),
}

/// Upper-case every string in `value`, recursing into arrays and objects.
pub fn uppercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        Value::Array(items) => Value::Array(items.iter().map(uppercase).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), uppercase(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Responder answering commands with upper-cased bodies.
pub struct UppercaseResponder {
    bus: Arc<dyn BusClient>,
    response_topic: Topic,
    echo: EchoKey,
    commands: mpsc::UnboundedReceiver<BusEvent>,
    subscription: SubscriptionHandle,
}

impl UppercaseResponder {
    /// Subscribe to `command_topic`. Commands published after this returns
    /// are answered once [`run`](Self::run) is driven.
    pub async fn subscribe(
        bus: Arc<dyn BusClient>,
        command_topic: &Topic,
        response_topic: Topic,
        echo: EchoKey,
    ) -> Result<Self, BusError> {
        let (tx, commands) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |event: BusEvent| {
            let _ = tx.send(event);
        });
        let subscription = bus.subscribe(command_topic, handler).await?;

        Ok(Self {
            bus,
            response_topic,
            echo,
            commands,
            subscription,
        })
    }

    /// Answer commands until the subscription ends.
    ///
    /// Should be spawned as a background task.
    #[instrument(skip(self), name = "uppercase_responder")]
    pub async fn run(mut self) {
        info!(
            command_topic = %self.subscription.topic(),
            response_topic = %self.response_topic,
            "Responder listening for commands"
        );

        while let Some(event) = self.commands.recv().await {
            self.handle(event).await;
        }

        info!("Responder stopped");
    }

    async fn handle(&self, event: BusEvent) {
        let envelope = match decode_command(&event) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %event.key, error = %e, "Ignoring malformed command");
                return;
            }
        };

        let key = match (&self.echo, envelope.id) {
            (EchoKey::Fixed(key), _) => key.clone(),
            (EchoKey::CorrelationId, Some(id)) => id,
            (EchoKey::CorrelationId, None) => return,
        };

        let body = uppercase(&envelope.body);
        let payload = match encode_response(&key, &body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not encode response");
                return;
            }
        };

        match self
            .bus
            .publish(&self.response_topic, key.as_str(), payload)
            .await
        {
            Ok(()) => debug!(key = %key, "Published response"),
            Err(e) => warn!(key = %key, error = %e, "Response publish failed"),
        }
    }
}
