//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Resolve the graceful-shutdown future of the server
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that fails to install is logged and never fires; the other
//!   signal still works

use tokio::signal;

/// Resolves when the process is asked to stop.
pub async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate() => {}
    }
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            tracing::info!("Received SIGTERM, shutting down");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
