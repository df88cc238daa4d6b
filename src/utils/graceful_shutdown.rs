use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM, SIGINT or a manual trigger
    Graceful,
    /// The drain deadline passed with requests still in flight
    Force,
}

/// Coordinates server shutdown.
///
/// Shutdown is announced through a [`CancellationToken`]; the server stops
/// accepting on it and in-flight relays derive their own tokens from it.
pub struct GracefulShutdown {
    token: CancellationToken,
    /// How long in-flight requests get after the signal
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new GracefulShutdown manager with default 30-second drain timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Manually trigger shutdown. Only the first trigger has an effect.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self.token.is_cancelled() {
            tracing::debug!("Shutdown already initiated, ignoring trigger");
            return;
        }
        tracing::info!("Shutdown triggered: {:?}", reason);
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then trigger a graceful shutdown.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = Self::wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.token.cancelled() => return,
        }

        self.trigger_shutdown(ShutdownReason::Graceful);
    }

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await;
    }

    /// Resolve once the drain deadline after the shutdown signal has passed.
    pub async fn drain_deadline(&self) -> ShutdownReason {
        self.token.cancelled().await;
        tokio::time::sleep(self.drain_timeout).await;
        tracing::warn!(
            "Drain timeout exceeded ({:?}), forcing shutdown",
            self.drain_timeout
        );
        ShutdownReason::Force
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
