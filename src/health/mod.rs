//! Dependency health report served by the API process
//!
//! ```json
//! {
//!   "status": "OK",
//!   "deps": [
//!     {"name": "PostgreSQL: schema `public`", "status": "OK", "type": "POSTGRES", "details": null}
//!   ]
//! }
//! ```
//!
//! The overall status is `OK` only if every dependency is `OK`.

pub mod postgres;
mod service;

pub use postgres::PostgresSchemaCheck;
pub use service::{DependencyCheck, HealthService, DEFAULT_CHECK_TIMEOUT};

#[cfg(test)]
pub use service::MockCheck;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Schema `{0}` not found")]
    SchemaMissing(String),

    #[error("Check timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyType {
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDetails {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub details: Option<DependencyDetails>,
}

impl DependencyHealth {
    pub fn ok(name: String, kind: DependencyType) -> Self {
        Self {
            name,
            status: HealthStatus::Ok,
            kind,
            details: None,
        }
    }

    pub fn error(name: String, kind: DependencyType, error: String) -> Self {
        Self {
            name,
            status: HealthStatus::Error,
            kind,
            details: Some(DependencyDetails { error }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub deps: Vec<DependencyHealth>,
}

impl HealthReport {
    pub fn from_deps(deps: Vec<DependencyHealth>) -> Self {
        let status = if deps.iter().all(|d| d.status == HealthStatus::Ok) {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        };
        Self { status, deps }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod service_tests;
