//! Bus-facing side of the bridge.

pub mod backoff;
pub mod bridge;

pub use backoff::{Backoff, RetryPolicy};
pub use bridge::Bridge;
