//! # Bridge Runtime
//!
//! Entry point for the request bridge process.
//!
//! Configuration comes from `BRIDGE_*` environment variables; see
//! [`bridge_runtime::RuntimeConfig`]. `BRIDGE_LOG` takes a tracing filter
//! directive such as `info` or `sync_bridge=debug,tower_http=info`.

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_runtime::{BridgeRuntime, RuntimeConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("Invalid configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let runtime = Arc::new(BridgeRuntime::new(config).await?);

    let serving = Arc::clone(&runtime);
    let mut server = tokio::spawn(async move { serving.start().await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C");
            runtime.shutdown();
            server.await.context("Server task panicked")??;
        }
        result = &mut server => {
            let result = result.context("Server task panicked")?;
            if let Err(e) = &result {
                error!(error = %e, "Bridge stopped unexpectedly");
            }
            result?;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
