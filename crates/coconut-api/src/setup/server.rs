//! HTTP listener for the bridge.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use coconut_core::Config;

/// Bind the configured port and serve `app` until SIGINT or SIGTERM.
pub async fn start_server(config: &Config, app: Router) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        max_upload_mb = config.max_upload_size_bytes() / 1024 / 1024,
        notification_url = %config.notification_url(),
        signed_uploads = config.notification_token().is_some(),
        serves_local_files = config.serves_local_files(),
        "Bridge listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(stop_requested())
        .await
        .context("Server error")?;

    tracing::info!("Bridge stopped");
    Ok(())
}

/// Resolves on the first stop signal. A signal that cannot be watched is logged
/// and never fires.
async fn stop_requested() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot watch for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot watch for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal, "Draining in-flight requests");
}
