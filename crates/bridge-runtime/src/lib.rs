//! # Bridge Runtime
//!
//! Process wiring for the request bridge.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `BRIDGE_*` environment variables
//! 2. Connect the bus backend (in-memory or Redis)
//! 3. Start the demo responder, if enabled
//! 4. Establish the response subscription
//! 5. Bind the HTTP listener and serve until shutdown

pub mod responder;

use anyhow::{Context, Result};
use shared_bus::{BusClient, InMemoryEventBus};
use std::str::FromStr;
use std::sync::Arc;
use sync_bridge::domain::config::{BusConfig, ConfigError};
use sync_bridge::{BridgeConfig, BridgeService, BusBackend, CorrelationId, CorrelationMode};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::responder::{EchoKey, UppercaseResponder};

/// Whether this process also answers its own commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderMode {
    /// Run the uppercase responder in-process
    Uppercase,
    /// Rely on an external responder
    None,
}

impl FromStr for ResponderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uppercase" => Ok(Self::Uppercase),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("unknown responder '{other}'")),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bridge: BridgeConfig,
    pub responder: ResponderMode,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build and validate configuration from `lookup`.
    ///
    /// Without `BRIDGE_RESPONDER`, the in-memory backend gets the uppercase
    /// responder (nothing else could answer) and Redis gets none.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut bridge = BridgeConfig::default();
        bridge.apply_env(&lookup)?;
        bridge.validate()?;

        let responder = match lookup("BRIDGE_RESPONDER") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                var: "BRIDGE_RESPONDER".into(),
                value,
            })?,
            None if bridge.bus.backend == BusBackend::Memory => ResponderMode::Uppercase,
            None => ResponderMode::None,
        };

        Ok(Self {
            bridge,
            responder,
            log_filter: lookup("BRIDGE_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Connect the configured bus backend.
pub async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn BusClient>> {
    match config.backend {
        BusBackend::Memory => {
            info!(capacity = config.channel_capacity, "Using in-memory bus");
            Ok(Arc::new(InMemoryEventBus::with_capacity(
                config.channel_capacity,
            )))
        }
        #[cfg(feature = "redis")]
        BusBackend::Redis => {
            let bus = shared_bus::RedisBus::connect(&config.endpoint)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.endpoint))?;
            info!(endpoint = %config.endpoint, "Using Redis bus");
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "redis"))]
        BusBackend::Redis => anyhow::bail!(
            "BRIDGE_BUS_BACKEND=redis requires bridge-runtime built with the `redis` feature"
        ),
    }
}

/// The running bridge process.
pub struct BridgeRuntime {
    config: RuntimeConfig,
    service: Arc<BridgeService>,
    responder: Option<JoinHandle<()>>,
}

impl BridgeRuntime {
    /// Connect the bus and build the service. Nothing is served yet.
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let bus = connect_bus(&config.bridge.bus).await?;
        Self::with_bus(config, bus).await
    }

    /// Build the runtime over an existing bus.
    pub async fn with_bus(config: RuntimeConfig, bus: Arc<dyn BusClient>) -> Result<Self> {
        let responder = match config.responder {
            ResponderMode::None => None,
            ResponderMode::Uppercase => {
                let echo = match config.bridge.correlation.mode {
                    CorrelationMode::PerRequest => EchoKey::CorrelationId,
                    CorrelationMode::FixedKey => EchoKey::Fixed(CorrelationId::new(
                        config.bridge.correlation.fixed_key.clone(),
                    )),
                };
                let responder = UppercaseResponder::subscribe(
                    Arc::clone(&bus),
                    &config.bridge.command_topic(),
                    config.bridge.response_topic(),
                    echo,
                )
                .await
                .context("Failed to start uppercase responder")?;
                Some(tokio::spawn(responder.run()))
            }
        };

        let service = BridgeService::new(bus, config.bridge.clone())
            .context("Failed to create bridge service")?;

        Ok(Self {
            config,
            service: Arc::new(service),
            responder,
        })
    }

    pub fn service(&self) -> Arc<BridgeService> {
        Arc::clone(&self.service)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Serve on the configured address until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Request Bridge v{}", sync_bridge::VERSION);
        info!("===========================================");
        info!(
            backend = ?self.config.bridge.bus.backend,
            endpoint = %self.config.bridge.bus.endpoint,
            mode = ?self.config.bridge.correlation.mode,
            responder = ?self.config.responder,
            timeout_ms = self.config.bridge.timeouts.request.as_millis() as u64,
            "Bridge configuration"
        );

        self.service.start().await.context("Bridge service failed")
    }

    /// Serve on an already bound listener.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        self.service.run(listener).await.context("Bridge service failed")
    }

    /// Stop serving and tear down the responder.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.service.shutdown();
        if let Some(responder) = &self.responder {
            responder.abort();
        }
    }
}
