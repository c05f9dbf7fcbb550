//! Domain types for the bridge: ids, requests, the correlator, configuration
//! and errors.

pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;
pub mod request;

pub use config::{
    BridgeConfig, BusBackend, BusConfig, ConfigError, CorrelationConfig, CorrelationMode,
    HttpConfig, SubscriptionRetryConfig, TimeoutConfig,
};
pub use correlation::CorrelationId;
pub use error::{BridgeError, BridgeResult, ServiceError};
pub use pending::{cleanup_task, Correlator, CorrelatorSnapshot, CorrelatorStats, WaitHandle};
pub use request::Request;
