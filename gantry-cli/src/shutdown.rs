//! SIGINT/SIGTERM handling.
//!
//! A signal cancels the shared token; in-flight runs observe it, clean up
//! and report `interrupted`.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CliError;

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after it is not lost.
pub fn cancel_on_signal(token: CancellationToken) -> Result<(), CliError> {
    let signals = ShutdownSignals::install()?;
    tokio::spawn(async move {
        let signal = signals.recv().await;
        warn!(signal, "shutdown signal received, cancelling runs");
        token.cancel();
    });
    Ok(())
}

#[cfg(unix)]
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self, CliError> {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| CliError::Signal(format!("failed to install SIGTERM handler: {e}")))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| CliError::Signal(format!("failed to install SIGINT handler: {e}")))?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self, CliError> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL-C",
            Err(_) => std::future::pending().await,
        }
    }
}
