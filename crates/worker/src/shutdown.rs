//! Process shutdown signal.

/// Wait for an external interrupt.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon
/// releases its GPU leases cleanly whether stopped interactively or by
/// a process manager (e.g. systemd, Docker, Kubernetes).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), releasing live allocations");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, releasing live allocations");
        }
    }
}
