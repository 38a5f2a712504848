//! PostgreSQL dependency check: the configured schema must exist

use super::{CheckError, DependencyCheck, DependencyType};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresSchemaCheck {
    pool: PgPool,
    schema: String,
}

impl PostgresSchemaCheck {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl DependencyCheck for PostgresSchemaCheck {
    fn name(&self) -> String {
        format!("PostgreSQL: schema `{}`", self.schema)
    }

    fn kind(&self) -> DependencyType {
        DependencyType::Postgres
    }

    async fn check(&self) -> Result<(), CheckError> {
        // schema_name is a sql_identifier domain, cast for decoding
        let found: Option<String> = sqlx::query_scalar(
            r#"
            SELECT schema_name::text
            FROM information_schema.schemata
            WHERE schema_name = $1
            "#,
        )
        .bind(&self.schema)
        .fetch_optional(&self.pool)
        .await?;

        match found {
            Some(name) if name == self.schema => Ok(()),
            _ => Err(CheckError::SchemaMissing(self.schema.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_database_reports_query_error() {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("warden")
            .database("warden");
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy_with(options);

        let check = PostgresSchemaCheck::new(pool, "public");
        assert_eq!(check.name(), "PostgreSQL: schema `public`");
        assert!(matches!(check.check().await, Err(CheckError::Query(_))));
    }
}
