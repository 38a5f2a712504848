//! Coordinated shutdown
//!
//! One `ShutdownController` per process; every server, scheduler and
//! supervised service holds a cloned `ShutdownSignal`. On SIGTERM/SIGINT the
//! binary flips the controller and each holder winds down on its own.

use tokio::sync::watch;
use tracing::info;

/// Receiving side of the shutdown channel
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown was triggered or the controller is gone
    pub async fn wait(&mut self) {
        // sender dropped counts as shutdown
        let _ = self.receiver.wait_for(|down| *down).await;
    }

    /// Non-blocking check
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
        info!("Shutdown signal sent");
    }
}

/// Create a controller and the signal to clone into components
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGTERM or SIGINT
///
/// Returns the name of the received signal, or an error when the handlers
/// cannot be registered.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "CTRL_C", "Received termination signal");
    Ok("CTRL_C")
}
