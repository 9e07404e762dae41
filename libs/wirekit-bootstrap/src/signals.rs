use anyhow::Result;
use std::fmt;
use tokio::signal;

/// Which OS signal ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        })
    }
}

/// Wait for Ctrl+C or (on unix) SIGTERM.
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let ctrl_c = async {
        signal::ctrl_c().await.map_err(|e| {
            tracing::error!(%e, "Failed to install Ctrl+C handler");
            e
        })
    };

    #[cfg(unix)]
    let terminate = async {
        let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
            tracing::error!(%e, "Failed to install SIGTERM handler");
            e
        })?;
        handler.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    let received = tokio::select! {
        result = ctrl_c => {
            result?;
            ShutdownSignal::Interrupt
        },
        result = terminate => {
            result?;
            ShutdownSignal::Terminate
        },
    };

    tracing::info!(signal = %received, "Shutdown signal received, initiating graceful shutdown");
    Ok(received)
}
