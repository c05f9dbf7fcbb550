//! Transport adapter: pure translation between HTTP bodies, bus envelopes and
//! bridge values. No state and no I/O.

pub mod http;
pub mod wire;

pub use http::{decode_request, encode_reply, status_for, BridgeReply, ErrorBody, ErrorDetail};
pub use wire::{decode_command, decode_response, encode_command, encode_response, WireEnvelope};
