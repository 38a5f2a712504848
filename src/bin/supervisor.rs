//! The supervisor process
//!
//! Reads the topology from `WARDEN_SUPERVISOR_CONFIG` (default
//! `supervisor.toml`), supervises every service and serves the control
//! surface until SIGTERM/SIGINT, then kills all processes.

use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use warden::config::{LogSettings, Topology};
use warden::lifecycle::{CommandLauncher, Supervisor, SystemClock};
use warden::server::{create_metrics, run_control_server, shutdown_channel, wait_for_signal};
use warden::telemetry;

const CONFIG_ENV: &str = "WARDEN_SUPERVISOR_CONFIG";
const DEFAULT_CONFIG: &str = "supervisor.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init(&LogSettings::from_env()?)?;

    let path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG));
    let topology = Topology::load(&path)
        .with_context(|| format!("Failed to load topology from {}", path.display()))?;
    info!(
        config = %path.display(),
        services = topology.services.len(),
        "Starting supervisor"
    );

    let metrics = create_metrics().context("Failed to create metrics registry")?;
    let supervisor = Supervisor::from_topology(
        &topology,
        Arc::new(CommandLauncher),
        Arc::new(SystemClock),
        Some(metrics.clone()),
    )?;

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let handle = supervisor.spawn(shutdown_signal.clone());

    let mut control_handle = tokio::spawn(run_control_server(
        topology.supervisor.control_port,
        handle.board(),
        handle.controls(),
        metrics,
        shutdown_signal,
    ));

    tokio::select! {
        result = wait_for_signal() => {
            let signal = result.context("Failed to install signal handlers")?;
            info!(signal, "Stopping all services");
        }
        result = &mut control_handle => {
            // the control server only returns on its own when it cannot serve
            shutdown_controller.shutdown();
            handle.join().await;
            return match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("Control server stopped unexpectedly")),
                Ok(Err(e)) => Err(e).context("Control server failed"),
                Err(e) => Err(e).context("Control server task panicked"),
            };
        }
    }
    shutdown_controller.shutdown();

    handle.join().await;
    match control_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Control server failed"),
        Err(e) => warn!(error = %e, "Control server task panicked"),
    }

    info!("Supervisor stopped");
    Ok(())
}
