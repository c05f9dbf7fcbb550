//! # Shared Bus - Publish/Subscribe Capability
//!
//! The thin bus client the bridge talks to. Two operations matter:
//!
//! - `publish(topic, key, payload)` - fire an event onto a named topic
//! - `subscribe(topic, handler)` - register a standing handler, returning only
//!   once the subscription is ready to receive
//!
//! ```text
//! ┌──────────────┐   publish(cmd)    ┌──────────────┐
//! │    Bridge    │ ────────────────→ │              │ ──→ responder
//! │              │                   │     Bus      │
//! │   handler    │ ←──────────────── │              │ ←── responder
//! └──────────────┘  subscribe(resp)  └──────────────┘
//! ```
//!
//! ## Backends
//!
//! - [`InMemoryEventBus`]: one `tokio::sync::broadcast` channel per topic
//! - `RedisBus` (feature `redis`): Redis pub/sub

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod error;
pub mod events;
pub mod publisher;
#[cfg(feature = "redis")]
pub mod redis_bus;
pub mod subscriber;

// Re-export main types
pub use error::BusError;
pub use events::{BusEvent, Topic};
pub use publisher::{BusClient, InMemoryEventBus};
#[cfg(feature = "redis")]
pub use redis_bus::RedisBus;
pub use subscriber::{
    spawn_handler, EventHandler, Subscription, SubscriptionError, SubscriptionHandle,
};

/// Maximum events to buffer per topic before slow subscribers lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
