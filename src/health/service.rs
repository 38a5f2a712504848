//! Runs dependency checks and folds them into a [`HealthReport`]

use super::{CheckError, DependencyHealth, DependencyType, HealthReport};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Upper bound on a single dependency check
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Shown instead of the real error when debug output is off
const REDACTED: &str = "dependency check failed";

/// Trait for dependency checks
///
/// Production code uses `PostgresSchemaCheck`.
/// Tests use `MockCheck` which returns a scripted result.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    /// Display name in the report
    fn name(&self) -> String;

    fn kind(&self) -> DependencyType;

    /// Read-only check; must not change state
    async fn check(&self) -> Result<(), CheckError>;
}

#[derive(Clone)]
pub struct HealthService {
    checks: Vec<Arc<dyn DependencyCheck>>,
    timeout: Duration,
    debug: bool,
}

impl HealthService {
    /// # Arguments
    /// * `checks` - Dependencies to verify on every report
    /// * `debug` - Include raw error text in failed entries
    pub fn new(checks: Vec<Arc<dyn DependencyCheck>>, debug: bool) -> Self {
        Self {
            checks,
            timeout: DEFAULT_CHECK_TIMEOUT,
            debug,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every check concurrently, each bounded by the timeout
    pub async fn report(&self) -> HealthReport {
        let deps = join_all(self.checks.iter().map(|check| self.run(check.as_ref()))).await;
        HealthReport::from_deps(deps)
    }

    async fn run(&self, check: &dyn DependencyCheck) -> DependencyHealth {
        let result = match tokio::time::timeout(self.timeout, check.check()).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => DependencyHealth::ok(check.name(), check.kind()),
            Err(e) => {
                error!(dependency = %check.name(), error = %e, "Health check failed");
                let details = if self.debug {
                    e.to_string()
                } else {
                    REDACTED.to_string()
                };
                DependencyHealth::error(check.name(), check.kind(), details)
            }
        }
    }
}

/// Mock check for testing
#[cfg(test)]
pub struct MockCheck {
    name: String,
    outcome: MockCheckOutcome,
}

#[cfg(test)]
enum MockCheckOutcome {
    Ok,
    MissingSchema(String),
    Hang,
}

#[cfg(test)]
impl MockCheck {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: MockCheckOutcome::Ok,
        }
    }

    pub fn missing_schema(name: &str, schema: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: MockCheckOutcome::MissingSchema(schema.to_string()),
        }
    }

    pub fn hanging(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: MockCheckOutcome::Hang,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DependencyCheck for MockCheck {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Postgres
    }

    async fn check(&self) -> Result<(), CheckError> {
        match &self.outcome {
            MockCheckOutcome::Ok => Ok(()),
            MockCheckOutcome::MissingSchema(schema) => Err(CheckError::SchemaMissing(schema.clone())),
            MockCheckOutcome::Hang => std::future::pending().await,
        }
    }
}
