//! Bus error types.

use thiserror::Error;

/// Errors surfaced by a [`BusClient`](crate::BusClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been closed; no further publishes or subscriptions.
    #[error("event bus closed")]
    Closed,

    /// The broker rejected or could not accept a publish.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// A subscription could not be established or acknowledged.
    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Connecting to the broker failed.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// A record read from the broker was malformed.
    #[error("malformed record: {0}")]
    Malformed(String),
}
