//! Sync Bridge - synchronous-over-asynchronous request bridging.
//!
//! Accepts a blocking HTTP request, publishes it as a command event on the
//! bus, waits for the correlated response event on a separate topic and
//! returns it to the caller as an ordinary request/response.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SYNC BRIDGE                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │   POST /bridge        GET /health        GET /pending         │
//! │        │                                                      │
//! │  ┌─────┴──────────────┐                                       │
//! │  │ Transport Adapter  │  decode_request / encode_reply        │
//! │  └─────┬──────────────┘                                       │
//! │  ┌─────┴──────────────┐      ┌──────────────────────┐         │
//! │  │      Bridge        │─────→│  Correlator          │         │
//! │  │ register/publish/  │      │  (waiter table)      │         │
//! │  │ wait               │      └──────────▲───────────┘         │
//! │  └─────┬──────────────┘                 │ resolve             │
//! └────────┼────────────────────────────────┼─────────────────────┘
//!          │ publish(command topic)         │ subscribe(response topic)
//!          ▼                                │
//!                         Bus
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sync_bridge::{BridgeConfig, BridgeService};
//!
//! let config = BridgeConfig::from_env()?;
//! let service = BridgeService::new(bus, config)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapter;
pub mod domain;
pub mod ipc;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for public API
pub use adapter::{BridgeReply, ErrorBody, WireEnvelope};
pub use domain::config::{BridgeConfig, BusBackend, CorrelationMode};
pub use domain::correlation::CorrelationId;
pub use domain::error::{BridgeError, BridgeResult, ServiceError};
pub use domain::pending::{Correlator, CorrelatorSnapshot, WaitHandle};
pub use ipc::{Bridge, RetryPolicy};
pub use service::BridgeService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
