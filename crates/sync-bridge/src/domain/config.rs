//! Bridge configuration with validation.
//!
//! Defaults match the reference deployment (broker on `localhost:9092`,
//! `CommunicationTopic` → `CommunicationRestTopic`, HTTP on port 4000).
//! Every field can be overridden from `BRIDGE_*` environment variables.

use serde::{Deserialize, Serialize};
use shared_bus::Topic;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Bus endpoint and topics
    pub bus: BusConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// How correlation ids are produced
    pub correlation: CorrelationConfig,
    /// Response subscription retry policy
    pub subscription: SubscriptionRetryConfig,
}

impl BridgeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `BRIDGE_*` overrides obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRIDGE_HTTP_HOST") {
            self.http.host = parse_var("BRIDGE_HTTP_HOST", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_HTTP_PORT") {
            self.http.port = parse_var("BRIDGE_HTTP_PORT", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_BUS_BACKEND") {
            self.bus.backend = parse_var("BRIDGE_BUS_BACKEND", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_BUS_ENDPOINT") {
            self.bus.endpoint = v;
        }
        if let Some(v) = lookup("BRIDGE_COMMAND_TOPIC") {
            self.bus.command_topic = v;
        }
        if let Some(v) = lookup("BRIDGE_RESPONSE_TOPIC") {
            self.bus.response_topic = v;
        }
        if let Some(v) = lookup("BRIDGE_REQUEST_TIMEOUT") {
            self.timeouts.request = parse_duration_var("BRIDGE_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_SUBSCRIBE_HEALTH_INTERVAL") {
            self.subscription.health_check_interval =
                parse_duration_var("BRIDGE_SUBSCRIBE_HEALTH_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_CORRELATION_MODE") {
            self.correlation.mode = parse_var("BRIDGE_CORRELATION_MODE", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_CORRELATION_KEY") {
            self.correlation.fixed_key = v;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.command_topic.is_empty() || self.bus.response_topic.is_empty() {
            return Err(ConfigError::InvalidTopic("topic names cannot be empty".into()));
        }

        // A bridge listening on its own command topic would take its own
        // commands for replies.
        if self.bus.command_topic == self.bus.response_topic {
            return Err(ConfigError::SameTopic(self.bus.command_topic.clone()));
        }

        if self.bus.endpoint.is_empty() && self.bus.backend != BusBackend::Memory {
            return Err(ConfigError::Invalid("bus endpoint cannot be empty".into()));
        }

        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity cannot be 0".into()));
        }

        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup interval cannot be 0".into(),
            ));
        }

        if self.correlation.mode == CorrelationMode::FixedKey
            && self.correlation.fixed_key.is_empty()
        {
            return Err(ConfigError::Invalid(
                "fixed-key correlation requires a non-empty key".into(),
            ));
        }

        if self.subscription.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "subscription max_attempts cannot be 0".into(),
            ));
        }

        if self.subscription.health_check_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "subscription health check interval cannot be 0".into(),
            ));
        }

        if self.http.max_request_size == 0 {
            return Err(ConfigError::Invalid("max_request_size cannot be 0".into()));
        }

        Ok(())
    }

    /// HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Outbound ("command") topic
    pub fn command_topic(&self) -> Topic {
        Topic::new(self.bus.command_topic.clone())
    }

    /// Inbound ("response") topic
    pub fn response_topic(&self) -> Topic {
        Topic::new(self.bus.response_topic.clone())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 4000)
    pub port: u16,
    /// Max request body size in bytes
    pub max_request_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4000,
            max_request_size: 1024 * 1024, // 1MB
        }
    }
}

/// Bus backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process broadcast bus
    Memory,
    /// Redis pub/sub (requires the `redis` feature)
    Redis,
}

impl FromStr for BusBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown bus backend '{other}'")),
        }
    }
}

/// Bus endpoint and topic names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Backend implementation
    pub backend: BusBackend,
    /// Broker address
    pub endpoint: String,
    /// Topic commands are published on
    pub command_topic: String,
    /// Topic responses arrive on
    pub response_topic: String,
    /// Per-topic buffer for the in-memory backend
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            endpoint: "localhost:9092".to_string(),
            command_topic: "CommunicationTopic".to_string(),
            response_topic: "CommunicationRestTopic".to_string(),
            channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request deadline for the correlated response
    #[serde(with = "humantime_serde")]
    pub request: Duration,
    /// Interval of the expired-waiter sweeper
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(10),
        }
    }
}

/// Whether the external responder can echo a per-request token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationMode {
    /// Fresh id per request; any number of requests in flight.
    #[default]
    PerRequest,
    /// Responder only echoes a fixed key; one request in flight at a time.
    FixedKey,
}

impl FromStr for CorrelationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-request" | "per_request" => Ok(Self::PerRequest),
            "fixed-key" | "fixed_key" => Ok(Self::FixedKey),
            other => Err(format!("unknown correlation mode '{other}'")),
        }
    }
}

/// Correlation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Correlation strategy
    pub mode: CorrelationMode,
    /// Key used in `fixed-key` mode
    pub fixed_key: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            mode: CorrelationMode::PerRequest,
            fixed_key: "myKey".to_string(),
        }
    }
}

/// Retry policy for establishing the response subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionRetryConfig {
    /// First retry delay
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Upper bound on a single retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Attempts before startup gives up and serves degraded
    pub max_attempts: u32,
    /// How often a running service checks that the subscription is alive
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
}

impl Default for SubscriptionRetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            max_attempts: 5,
            health_check_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Command and response topics are the same
    #[error("command and response topics must differ (both '{0}')")]
    SameTopic(String),
    /// Invalid topic name
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Environment variable could not be parsed
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_duration_var(var: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::parse_duration(value).map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Duration (de)serialization as `"500ms"`, `"10s"`, `"2m"`.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before the single-letter suffixes
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
