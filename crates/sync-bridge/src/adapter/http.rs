//! HTTP side of the transport adapter.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful bridged reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReply {
    pub correlation_id: CorrelationId,
    pub body: Value,
    pub elapsed_ms: u64,
}

/// Error reply body: `{"error": {"code", "message"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&BridgeError> for ErrorBody {
    fn from(err: &BridgeError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Decode an inbound request body. Any JSON value is accepted.
pub fn decode_request(body: &[u8]) -> BridgeResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::Decode("empty request body".into()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Encode a reply for the HTTP caller.
pub fn encode_reply(reply: &BridgeReply) -> BridgeResult<Vec<u8>> {
    serde_json::to_vec(reply).map_err(|e| BridgeError::Encode(e.to_string()))
}

/// HTTP status for a bridge failure.
pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Decode(_) => StatusCode::BAD_REQUEST,
        BridgeError::Encode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::PublishFailed(_) => StatusCode::BAD_GATEWAY,
        BridgeError::SubscriptionSetupFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::DuplicateCorrelation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(ErrorBody::from(&self))).into_response()
    }
}
