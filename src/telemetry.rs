//! Logging setup shared by both binaries
//!
//! `RUST_LOG` wins over the configured level when set.

use crate::config::LogSettings;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(settings))
}

fn default_filter(settings: &LogSettings) -> EnvFilter {
    let level = settings.level.0.as_str().to_lowercase();
    // sqlx logs every statement at info
    EnvFilter::new(format!("{level},sqlx=warn"))
}

/// Install the global subscriber; JSON lines when `settings.json` is set
pub fn init(settings: &LogSettings) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(env_filter(settings));

    if settings.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json(),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init()?;
    }
    Ok(())
}
