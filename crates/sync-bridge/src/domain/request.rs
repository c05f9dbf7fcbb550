//! One inbound synchronous call, as seen by the bridge.

use crate::domain::correlation::CorrelationId;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// An inbound request awaiting its correlated response.
///
/// Owned by a single bridge call; dropped once the response is resolved or
/// the deadline passes.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id echoed by the responder.
    pub id: CorrelationId,
    /// Application payload decoded from the inbound call.
    pub payload: serde_json::Value,
    /// Wall-clock arrival time.
    pub arrived_at: DateTime<Utc>,
    /// Monotonic deadline for the response.
    pub deadline: Instant,
}

impl Request {
    /// Create a request arriving now with `timeout` to live.
    pub fn new(id: CorrelationId, payload: serde_json::Value, timeout: Duration) -> Self {
        Self {
            id,
            payload,
            arrived_at: Utc::now(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Time left before the deadline (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
