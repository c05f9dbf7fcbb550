//! Bridge service - HTTP front end, background tasks and lifecycle.

use crate::adapter::http::{decode_request, encode_reply};
use crate::domain::config::BridgeConfig;
use crate::domain::error::{BridgeError, ServiceError};
use crate::domain::pending::cleanup_task;
use crate::ipc::backoff::RetryPolicy;
use crate::ipc::bridge::Bridge;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared_bus::BusClient;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Bridge service state
pub struct BridgeService {
    config: BridgeConfig,
    bridge: Arc<Bridge>,
    shutdown_tx: watch::Sender<bool>,
}

impl BridgeService {
    /// Create a new bridge service over `bus`.
    pub fn new(bus: Arc<dyn BusClient>, config: BridgeConfig) -> Result<Self, ServiceError> {
        let bridge = Arc::new(Bridge::new(bus, &config)?);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            bridge,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn bridge(&self) -> Arc<Bridge> {
        Arc::clone(&self.bridge)
    }

    /// Establish the response subscription, then bind and serve until
    /// [`shutdown`](Self::shutdown) is called.
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.prepare().await;

        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Bind(format!("{addr}: {e}")))?;

        self.serve(listener).await
    }

    /// Like [`start`](Self::start) on an already bound listener.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServiceError> {
        self.prepare().await;
        self.serve(listener).await
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState {
            bridge: Arc::clone(&self.bridge),
        };

        let middleware = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(self.config.http.max_request_size));

        Router::new()
            .route("/bridge", post(handle_bridge))
            .route(LEGACY_BRIDGE_PATH, post(handle_bridge))
            .route("/health", get(health_check))
            .route("/pending", get(pending_stats))
            .layer(middleware)
            .with_state(state)
    }

    /// Open the response subscription before accepting traffic. On failure
    /// the service still starts and serves degraded.
    async fn prepare(&self) {
        let policy = RetryPolicy::from(self.config.subscription.clone());
        if let Err(e) = self.bridge.establish_subscription(&policy).await {
            warn!(error = %e, "Serving degraded until the response subscription is up");
        }
    }

    async fn serve(&self, listener: TcpListener) -> Result<(), ServiceError> {
        let sweeper = tokio::spawn(cleanup_task(
            self.bridge.correlator().clone(),
            self.config.timeouts.cleanup_interval,
        ));
        let supervisor = self.spawn_subscription_supervisor();

        match listener.local_addr() {
            Ok(addr) => info!(
                addr = %addr,
                command_topic = %self.bridge.command_topic(),
                response_topic = %self.bridge.response_topic(),
                "Bridge listening"
            ),
            Err(e) => warn!(error = %e, "Bridge listening on unknown address"),
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await
            .map_err(|e| ServiceError::Serve(e.to_string()));

        sweeper.abort();
        supervisor.abort();
        self.bridge.shutdown();

        match &result {
            Ok(()) => info!("Bridge service stopped"),
            Err(e) => error!(error = %e, "Bridge service failed"),
        }
        result
    }

    /// Watch the response subscription and re-establish it with backoff
    /// whenever it is down, whether it never came up or ended later.
    fn spawn_subscription_supervisor(&self) -> JoinHandle<()> {
        let bridge = Arc::clone(&self.bridge);
        let policy = RetryPolicy::from(self.config.subscription.clone());
        let interval = self.config.subscription.health_check_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                if !bridge.is_ready() {
                    tokio::select! {
                        _ = shutdown_rx.wait_for(|stop| *stop) => return,
                        result = bridge.establish_subscription(&policy) => match result {
                            Ok(()) => info!("Response subscription recovered"),
                            Err(e) => warn!(error = %e, "Response subscription still down"),
                        },
                    }
                }
                tokio::select! {
                    _ = shutdown_rx.wait_for(|stop| *stop) => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    }
}

/// Path the bridge was served under before `/bridge`; kept for existing clients.
pub const LEGACY_BRIDGE_PATH: &str = "/communication/restKafkaGRPC/";

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    bridge: Arc<Bridge>,
}

/// Bridge one HTTP request over the bus.
async fn handle_bridge(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, BridgeError> {
    let payload = decode_request(&body).inspect_err(log_failure)?;
    let reply = state.bridge.call(payload).await.inspect_err(log_failure)?;
    let encoded = encode_reply(&reply).inspect_err(log_failure)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        encoded,
    )
        .into_response())
}

fn log_failure(err: &BridgeError) {
    if err.is_client_error() {
        debug!(code = err.code(), error = %err, "Rejected bridge request");
    } else if err.is_retryable() {
        warn!(code = err.code(), error = %err, "Bridge request failed, retryable");
    } else {
        error!(code = err.code(), error = %err, "Bridge request failed");
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.bridge.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ok" } else { "degraded" },
            "subscription_ready": ready,
        })),
    )
}

async fn pending_stats(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.bridge.correlator().snapshot();
    Json(serde_json::json!({
        "count": snapshot.pending,
        "timeout_ms": state.bridge.timeout().as_millis() as u64,
        "stats": snapshot,
    }))
}
