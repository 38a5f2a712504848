//! Expired session cleanup

use super::{Job, JobError};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

pub const SESSION_CLEANUP_EVERY: Duration = Duration::from_secs(6 * 60 * 60);

/// Deletes sessions whose `expires_at` lies in the past
pub struct SessionCleanupJob {
    pool: PgPool,
    schema: String,
}

impl SessionCleanupJob {
    /// `schema` must be a validated identifier; it is interpolated quoted
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn statement(&self) -> String {
        format!(
            r#"DELETE FROM "{}"."session" WHERE expires_at < now()"#,
            self.schema
        )
    }
}

#[async_trait]
impl Job for SessionCleanupJob {
    fn name(&self) -> &str {
        "session_cleanup"
    }

    fn every(&self) -> Duration {
        SESSION_CLEANUP_EVERY
    }

    async fn run(&self) -> Result<u64, JobError> {
        let statement = self.statement();
        let result = sqlx::query(&statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    fn lazy_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("warden")
            .database("warden");
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy_with(options)
    }

    #[tokio::test]
    async fn test_statement_targets_schema_session_table() {
        let job = SessionCleanupJob::new(lazy_pool(), "auth");
        assert_eq!(
            job.statement(),
            r#"DELETE FROM "auth"."session" WHERE expires_at < now()"#
        );
        assert_eq!(job.every(), Duration::from_secs(21_600));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_a_job_error() {
        let job = SessionCleanupJob::new(lazy_pool(), "public");
        assert!(matches!(job.run().await, Err(JobError::Database(_))));
    }
}
