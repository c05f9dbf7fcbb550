//! Bridge error taxonomy.
//!
//! Every variant except `SubscriptionSetupFailed` is local to one request and
//! never affects other calls in flight.

use crate::domain::config::ConfigError;
use crate::domain::correlation::CorrelationId;
use shared_bus::BusError;

/// Stable machine-readable error codes carried in error replies.
pub mod codes {
    pub const DUPLICATE_CORRELATION: &str = "DUPLICATE_CORRELATION";
    pub const PUBLISH_FAILED: &str = "PUBLISH_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const ENCODE_ERROR: &str = "ENCODE_ERROR";
    pub const SUBSCRIPTION_SETUP_FAILED: &str = "SUBSCRIPTION_SETUP_FAILED";
}

/// Failure of one bridged request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A waiter is already registered under this id.
    #[error("correlation id already pending: {0}")]
    DuplicateCorrelation(CorrelationId),

    /// The bus did not accept the outbound command.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// No correlated response arrived before the deadline.
    #[error("no response for {id} within {timeout_ms}ms")]
    Timeout { id: CorrelationId, timeout_ms: u64 },

    /// Malformed inbound request or response event.
    #[error("decode error: {0}")]
    Decode(String),

    /// Reply or command could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The response-topic subscription is not established.
    #[error("response subscription unavailable: {0}")]
    SubscriptionSetupFailed(String),
}

impl BridgeError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateCorrelation(_) => codes::DUPLICATE_CORRELATION,
            Self::PublishFailed(_) => codes::PUBLISH_FAILED,
            Self::Timeout { .. } => codes::TIMEOUT,
            Self::Decode(_) => codes::DECODE_ERROR,
            Self::Encode(_) => codes::ENCODE_ERROR,
            Self::SubscriptionSetupFailed(_) => codes::SUBSCRIPTION_SETUP_FAILED,
        }
    }

    /// Whether re-issuing the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::PublishFailed(_) | Self::SubscriptionSetupFailed(_)
        )
    }

    /// Whether the caller sent something malformed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Encode(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Service-level errors (startup and wiring, not per request).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Bus connection error
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// HTTP server terminated with an error
    #[error("server error: {0}")]
    Serve(String),
}
