//! Pre-flight: open the database pool before serving
//!
//! The API process must not report ready while its database is unreachable,
//! so startup fails fast here with a non-zero exit.

use crate::config::PostgresSettings;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Bound on acquiring a pooled connection
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Database {host}:{port} unreachable: {source}")]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },
}

pub fn connect_options(settings: &PostgresSettings) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.db)
}

/// Open the pool and verify it with a round trip
pub async fn connect(settings: &PostgresSettings) -> Result<PgPool, PreflightError> {
    connect_with_timeout(settings, ACQUIRE_TIMEOUT).await
}

pub async fn connect_with_timeout(
    settings: &PostgresSettings,
    acquire_timeout: Duration,
) -> Result<PgPool, PreflightError> {
    let unreachable = |source| PreflightError::Unreachable {
        host: settings.host.clone(),
        port: settings.port,
        source,
    };

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(acquire_timeout)
        .connect_with(connect_options(settings))
        .await
        .map_err(unreachable)?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(unreachable)?;

    info!(
        host = %settings.host,
        port = settings.port,
        db = %settings.db,
        "Database connection verified"
    );
    Ok(pool)
}
