//! # Bus Events
//!
//! Defines the values that travel over the bus: named [`Topic`]s and the
//! [`BusEvent`]s published on them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A named logical channel on the bus.
///
/// Topics are immutable values. Routing on every backend is by `name`; the
/// optional partition key is carried along for backends that partition
/// their channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
}

impl Topic {
    /// Create a topic with no partition key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: None,
        }
    }

    /// Create a topic pinned to a partition key.
    pub fn with_partition_key(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: Some(partition_key.into()),
        }
    }

    /// Channel name used for routing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partition key, if any.
    #[must_use]
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition_key {
            Some(partition) => write!(f, "{}[{}]", self.name, partition),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A message travelling over a [`Topic`].
///
/// The payload is opaque to the bus. `key` doubles as the correlation field
/// for transports that have no dedicated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Topic the event was published on.
    pub topic: Topic,
    /// Message key.
    pub key: String,
    /// Opaque payload.
    pub payload: Bytes,
    /// Publish time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl BusEvent {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(topic: Topic, key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            key: key.into(),
            payload: payload.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Current wall-clock time in milliseconds; 0 if the clock is before the epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
