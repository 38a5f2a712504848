//! The API process
//!
//! Loads settings once, verifies the database, serves the health endpoint
//! and, when enabled, runs scheduled jobs until SIGTERM/SIGINT.

use anyhow::Context as _;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use warden::config::Settings;
use warden::cron::{Job, Scheduler, SessionCleanupJob};
use warden::health::{DependencyCheck, HealthService, PostgresSchemaCheck};
use warden::server::{run_api_server, shutdown_channel, wait_for_signal, ReadinessState};
use warden::{preflight, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Invalid configuration")?;
    telemetry::init(&settings.log)?;

    info!(
        mode = %settings.app.mode,
        debug = settings.app.debug,
        cron_jobs = settings.app.cron_jobs_enable,
        "Server is starting"
    );
    let addr = settings.app.bind_addr()?;

    let pool = match preflight::connect(&settings.postgres).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Pre-flight failed");
            return Err(e.into());
        }
    };

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();

    let checks: Vec<Arc<dyn DependencyCheck>> = vec![Arc::new(PostgresSchemaCheck::new(
        pool.clone(),
        settings.postgres.schema.clone(),
    ))];
    let health = HealthService::new(checks, settings.app.debug);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let mut server_handle = tokio::spawn(run_api_server(
        listener,
        readiness.clone(),
        health,
        shutdown_signal.clone(),
    ));

    let scheduler_handle = if settings.app.cron_jobs_enable {
        let jobs: Vec<Arc<dyn Job>> = vec![Arc::new(SessionCleanupJob::new(
            pool.clone(),
            settings.postgres.schema.clone(),
        ))];
        Some(tokio::spawn(Scheduler::new(jobs).run(shutdown_signal)))
    } else {
        info!("Scheduled jobs disabled");
        None
    };

    readiness.set_ready();
    info!("Server ready");

    tokio::select! {
        result = wait_for_signal() => {
            let signal = result.context("Failed to install signal handlers")?;
            info!(signal, "Initiating graceful shutdown");
        }
        result = &mut server_handle => {
            // the server only returns on its own when it cannot serve
            shutdown_controller.shutdown();
            return match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("API server stopped unexpectedly")),
                Ok(Err(e)) => Err(e).context("API server failed"),
                Err(e) => Err(e).context("API server task panicked"),
            };
        }
    }

    readiness.set_not_ready();
    shutdown_controller.shutdown();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task panicked"),
    }
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Scheduler task panicked");
        }
    }
    pool.close().await;

    info!("Server is shutting down");
    Ok(())
}
