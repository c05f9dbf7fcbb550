//! # Redis Pub/Sub Bus Client
//!
//! Broker-backed [`BusClient`] over Redis pub/sub. Each topic maps to a Redis
//! channel of the same name. Redis messages have no key field, so every
//! record is framed as `[u32 BE key length][key bytes][payload bytes]`.
//!
//! Subscription readiness is the server's `SUBSCRIBE` acknowledgment: the
//! `subscribe` future resolves only after Redis has confirmed the channel.

use crate::error::BusError;
use crate::events::{BusEvent, Topic};
use crate::publisher::BusClient;
use crate::subscriber::{EventHandler, SubscriptionHandle};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

/// Redis-backed bus client.
pub struct RedisBus {
    endpoint: String,
    client: redis::Client,
    connection: MultiplexedConnection,
}

impl RedisBus {
    /// Connect to the broker at `endpoint` (`host:port` or a `redis://` URL).
    pub async fn connect(endpoint: &str) -> Result<Self, BusError> {
        let url = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("redis://{endpoint}")
        };
        let connection_error = |e: redis::RedisError| BusError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        };

        let client = redis::Client::open(url.as_str()).map_err(connection_error)?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(connection_error)?;

        info!(endpoint = %endpoint, "Connected to Redis bus");
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            connection,
        })
    }

    /// Broker endpoint this client is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BusClient for RedisBus {
    async fn publish(&self, topic: &Topic, key: &str, payload: Bytes) -> Result<(), BusError> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(topic.name(), encode_record(key, &payload).to_vec())
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!(topic = %topic, key = %key, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle, BusError> {
        let subscribe_error = |e: redis::RedisError| BusError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(subscribe_error)?;
        pubsub
            .subscribe(topic.name())
            .await
            .map_err(subscribe_error)?;

        info!(topic = %topic, "Redis subscription acknowledged");

        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                match decode_record(Bytes::copy_from_slice(message.get_payload_bytes())) {
                    Ok((key, payload)) => {
                        handler(BusEvent::new(task_topic.clone(), key, payload));
                    }
                    Err(e) => {
                        warn!(topic = %task_topic, error = %e, "Dropping malformed Redis record");
                    }
                }
            }
            warn!(topic = %task_topic, "Redis message stream ended");
        });

        Ok(SubscriptionHandle::new(topic.clone(), task))
    }
}

/// Frame a key and payload into one Redis message.
pub fn encode_record(key: &str, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + key.len() + payload.len());
    buf.put_u32(key.len() as u32);
    buf.put_slice(key.as_bytes());
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a framed Redis message back into key and payload.
pub fn decode_record(mut record: Bytes) -> Result<(String, Bytes), BusError> {
    if record.remaining() < 4 {
        return Err(BusError::Malformed("record shorter than header".into()));
    }
    let key_len = record.get_u32() as usize;
    if record.remaining() < key_len {
        return Err(BusError::Malformed(format!(
            "key length {key_len} exceeds record"
        )));
    }
    let key = String::from_utf8(record.split_to(key_len).to_vec())
        .map_err(|e| BusError::Malformed(format!("key is not UTF-8: {e}")))?;
    Ok((key, record))
}
