//! Signal handling for graceful shutdown

use crate::service::ServiceState;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (sigint_tx, sigterm_tx) = fan_in(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C signal: {e}");
            return;
        }
        info!("Ctrl+C signal received");
        if let Some(tx) = sigint_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use signal_hook::consts::SIGTERM;
            use std::sync::atomic::{AtomicBool, Ordering};

            let flag = Arc::new(AtomicBool::new(false));
            if let Err(e) = signal_hook::flag::register(SIGTERM, flag.clone()) {
                error!("failed to register SIGTERM handler: {e}");
                return;
            }

            loop {
                if flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    if let Some(tx) = sigterm_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    #[cfg(not(unix))]
    drop(sigterm_tx);

    Ok(shutdown_rx)
}

type SharedSender = Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>;

// Either signal fires the single shutdown channel; whoever arrives second
// finds the sender already taken.
fn fan_in(tx: oneshot::Sender<()>) -> (SharedSender, SharedSender) {
    let shared = Arc::new(std::sync::Mutex::new(Some(tx)));
    (shared.clone(), shared)
}

/// Graceful shutdown handler: stop dispatching, let running workers finish
/// (within the configured timeout), then flush the WAL.
pub async fn graceful_shutdown(
    service_state: Arc<ServiceState>,
    scheduler_handle: tokio::task::JoinHandle<()>,
    gateway_handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    info!("starting graceful shutdown");

    service_state.shutdown_token().cancel();

    let shutdown_timeout =
        Duration::from_secs(service_state.config.service.shutdown_timeout_secs);

    match timeout(shutdown_timeout, service_state.scheduler.wait_for_completion()).await {
        Ok(()) => info!("all workers drained"),
        Err(_) => warn!("workers did not drain within timeout, forcing shutdown"),
    }

    match timeout(shutdown_timeout, scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => error!("scheduler task failed: {e}"),
        Err(_) => warn!("scheduler did not stop within timeout"),
    }

    match timeout(shutdown_timeout, gateway_handle).await {
        Ok(Ok(())) => info!("gateway stopped gracefully"),
        Ok(Err(e)) => error!("gateway task failed: {e}"),
        Err(_) => warn!("gateway did not stop within timeout"),
    }

    if let Err(e) = service_state.wal.flush().await {
        error!("failed to flush WAL during shutdown: {e}");
    }

    info!("graceful shutdown complete");
    Ok(())
}
