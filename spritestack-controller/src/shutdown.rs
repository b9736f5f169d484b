use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Shutdown state driven by SIGTERM and SIGINT.
///
/// The first signal cancels `graceful` so subsystems drain. Any later signal
/// cancels `forced`, telling the process to stop waiting on the drain.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    graceful: CancellationToken,
    forced: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graceful(&self) -> &CancellationToken {
        &self.graceful
    }

    pub fn forced(&self) -> &CancellationToken {
        &self.forced
    }

    /// Escalates one step for a received signal
    pub fn signal(&self, name: &str) {
        if self.graceful.is_cancelled() {
            tracing::warn!("Received {} while draining, forcing shutdown", name);
            self.forced.cancel();
        } else {
            tracing::info!(
                "Received {}, initiating graceful shutdown (send again to force)",
                name
            );
            self.graceful.cancel();
        }
    }
}

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a [`Shutdown`] whose tokens are cancelled by the first and second signal.
pub fn install_shutdown_handler() -> Result<Shutdown> {
    let shutdown = Shutdown::new();
    let handler = shutdown.clone();

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        while !handler.forced().is_cancelled() {
            tokio::select! {
                _ = sigterm.recv() => handler.signal("SIGTERM"),
                _ = sigint.recv() => handler.signal("SIGINT"),
            }
        }
    });

    Ok(shutdown)
}
