//! Prodline orchestrator service
//!
//! Entry point for the production-line orchestrator: loads configuration,
//! recovers unfinished orders from the write-ahead log, starts the
//! scheduler and the gateway, and shuts everything down cleanly on
//! SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use prodline_service::{
    graceful_shutdown, initialize_logging, load_config, setup_signal_handlers, ServiceState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A broken config or WAL must exit non-zero before anything runs.
    let config = load_config().context("failed to load configuration")?;
    initialize_logging(&config.logging)?;

    info!("starting prodline service v{}", env!("CARGO_PKG_VERSION"));

    let seed_demo_orders = config.service.seed_demo_orders;
    let state =
        Arc::new(ServiceState::new(config).context("failed to initialize service state")?);

    let recovered = state.recover().await?;
    info!(recovered, "WAL recovery completed");

    let scheduler_handle = state.start_scheduler();
    let gateway_handle = state.start_gateway()?;

    if seed_demo_orders {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = state.seed_demo_orders().await {
                tracing::error!(%error, "demo order seeding failed");
            }
        });
    }

    let shutdown_signal = setup_signal_handlers()?;
    info!("prodline service is running, press Ctrl+C to shut down");
    let _ = shutdown_signal.await;

    info!("shutdown signal received, initiating graceful shutdown");
    graceful_shutdown(state, scheduler_handle, gateway_handle).await?;

    info!("prodline service shutdown complete");
    Ok(())
}
