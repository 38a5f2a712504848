//! Tests for the dependency health report

use super::*;
use std::sync::Arc;
use std::time::Duration;

fn service(checks: Vec<Arc<dyn DependencyCheck>>, debug: bool) -> HealthService {
    HealthService::new(checks, debug)
}

#[tokio::test]
async fn test_all_dependencies_ok() {
    let health = service(vec![Arc::new(MockCheck::ok("PostgreSQL: schema `public`"))], true);

    let report = health.report().await;

    assert!(report.is_ok());
    assert_eq!(report.deps.len(), 1);
    assert_eq!(report.deps[0].status, HealthStatus::Ok);
    assert_eq!(report.deps[0].details, None);
}

#[tokio::test]
async fn test_one_failed_dependency_fails_report() {
    let health = service(
        vec![
            Arc::new(MockCheck::ok("cache")),
            Arc::new(MockCheck::missing_schema("PostgreSQL: schema `auth`", "auth")),
        ],
        true,
    );

    let report = health.report().await;

    assert_eq!(report.status, HealthStatus::Error);
    assert_eq!(report.deps[0].status, HealthStatus::Ok);
    assert_eq!(
        report.deps[1].details,
        Some(DependencyDetails {
            error: "Schema `auth` not found".to_string()
        })
    );
}

#[tokio::test]
async fn test_error_details_redacted_without_debug() {
    let health = service(
        vec![Arc::new(MockCheck::missing_schema("db", "auth"))],
        false,
    );

    let report = health.report().await;

    let details = report.deps[0].details.as_ref().expect("failed dep has details");
    assert!(!details.error.contains("auth"));
    assert_eq!(details.error, "dependency check failed");
}

#[tokio::test(start_paused = true)]
async fn test_hanging_check_times_out_as_error() {
    let health = service(vec![Arc::new(MockCheck::hanging("db"))], true)
        .with_timeout(Duration::from_secs(3));

    let report = health.report().await;

    assert_eq!(report.status, HealthStatus::Error);
    let details = report.deps[0].details.as_ref().expect("details");
    assert!(details.error.contains("timed out"));
}

#[tokio::test]
async fn test_empty_report_is_ok() {
    assert!(service(Vec::new(), true).report().await.is_ok());
}

#[test]
fn test_report_json_shape() {
    let report = HealthReport::from_deps(vec![DependencyHealth::error(
        "PostgreSQL: schema `public`".to_string(),
        DependencyType::Postgres,
        "boom".to_string(),
    )]);

    let json = serde_json::to_value(&report).expect("serialize");

    assert_eq!(
        json,
        serde_json::json!({
            "status": "ERROR",
            "deps": [{
                "name": "PostgreSQL: schema `public`",
                "status": "ERROR",
                "type": "POSTGRES",
                "details": {"error": "boom"}
            }]
        })
    );
}
