//! Wire side of the transport adapter: command and response envelopes.
//!
//! Both topics carry `{"id": "<correlation id>", "body": <json>}`. Responders
//! that cannot produce an envelope may publish a bare JSON value or plain
//! UTF-8 text; the event key then supplies the correlation id.
//!
//! A JSON object is read as an envelope only when it has a `body` key, no
//! keys besides `id` and `body`, and a string `id` if any. Any other object
//! is a bare value and is delivered whole.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_bus::BusEvent;

/// Envelope exchanged on the command and response topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    #[serde(default)]
    pub body: Value,
}

/// Encode an outbound command.
pub fn encode_command(id: &CorrelationId, body: &Value) -> BridgeResult<Bytes> {
    let envelope = WireEnvelope {
        id: Some(id.clone()),
        body: body.clone(),
    };
    serde_json::to_vec(&envelope)
        .map(Bytes::from)
        .map_err(|e| BridgeError::Encode(e.to_string()))
}

/// Decode a response event into its correlation id and body.
///
/// The envelope `id` wins over the event key. An event with neither is
/// undeliverable and reported as a decode error.
pub fn decode_response(event: &BusEvent) -> BridgeResult<(CorrelationId, Value)> {
    let (id, body) = match serde_json::from_slice::<Value>(&event.payload) {
        Ok(Value::Object(map)) if is_envelope(&map) => {
            let envelope: WireEnvelope = serde_json::from_value(Value::Object(map))?;
            (envelope.id, envelope.body)
        }
        Ok(value) => (None, value),
        Err(_) => {
            let text = std::str::from_utf8(&event.payload).map_err(|_| {
                BridgeError::Decode(format!(
                    "response on {} is neither JSON nor UTF-8 text",
                    event.topic
                ))
            })?;
            (None, Value::String(text.to_string()))
        }
    };

    let id = id
        .filter(|id| !id.is_empty())
        .or_else(|| (!event.key.is_empty()).then(|| CorrelationId::new(event.key.clone())))
        .ok_or_else(|| {
            BridgeError::Decode(format!("response on {} carries no correlation id", event.topic))
        })?;

    Ok((id, body))
}

fn is_envelope(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("body")
        && map.keys().all(|key| key == "id" || key == "body")
        && map.get("id").map_or(true, |id| id.is_string() || id.is_null())
}

/// Decode an inbound command (responder side).
pub fn decode_command(event: &BusEvent) -> BridgeResult<WireEnvelope> {
    let mut envelope: WireEnvelope = serde_json::from_slice(&event.payload)?;
    if envelope.id.as_ref().map_or(true, CorrelationId::is_empty) {
        if event.key.is_empty() {
            return Err(BridgeError::Decode(format!(
                "command on {} carries no correlation id",
                event.topic
            )));
        }
        envelope.id = Some(CorrelationId::new(event.key.clone()));
    }
    Ok(envelope)
}

/// Encode a response (responder side).
pub fn encode_response(id: &CorrelationId, body: &Value) -> BridgeResult<Bytes> {
    encode_command(id, body)
}
