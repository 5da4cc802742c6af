//! Graceful shutdown signal handling.

use tokio::sync::oneshot;
use tracing::info;

/// Returns a receiver triggered on SIGINT/SIGTERM (Ctrl+C on Windows).
pub async fn setup_shutdown_handler() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let sigint = signal(SignalKind::interrupt());
            let sigterm = signal(SignalKind::terminate());
            let (Ok(mut sigint), Ok(mut sigterm)) = (sigint, sigterm) else {
                tracing::error!("Failed to install signal handlers");
                return;
            };

            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received - shutting down"),
                _ = sigterm.recv() => info!("SIGTERM received - shutting down"),
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows::ctrl_c;

            let Ok(mut ctrl_c) = ctrl_c() else {
                tracing::error!("Failed to install Ctrl+C handler");
                return;
            };
            ctrl_c.recv().await;
            info!("Ctrl+C received - shutting down");
        }

        let _ = tx.send(());
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn handler_installs_without_firing() {
        let shutdown_rx = setup_shutdown_handler().await;
        let result = timeout(Duration::from_millis(10), shutdown_rx).await;
        assert!(result.is_err(), "shutdown fired without a signal");
    }
}
