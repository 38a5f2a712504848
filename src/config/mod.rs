//! Configuration for both processes
//!
//! - [`Settings`]: API process, read once from the environment
//! - [`Topology`]: supervisor, read once from a TOML file

pub mod duration;
mod settings;
mod topology;

pub use settings::{
    AppSettings, LogLevel, LogSettings, Mode, PostgresSettings, Settings, DEFAULT_API_PORT,
    DEFAULT_POSTGRES_PORT,
};
pub use topology::{
    HealthcheckDefinition, ProbeTarget, ServiceDefinition, SupervisorSettings, Topology,
    DEFAULT_CONTROL_PORT,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read topology file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse topology: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid topology: {0}")]
    Topology(String),
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod settings_tests;

#[cfg(test)]
#[path = "topology_test.rs"]
mod topology_tests;
