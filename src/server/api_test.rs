//! Tests for the API health endpoint

use super::*;
use crate::health::{HealthReport, HealthService, HealthStatus, MockCheck};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Wait for the server to accept connections, retrying with backoff
async fn wait_for_server(port: u16, max_retries: u32) -> reqwest::Client {
    let client = reqwest::Client::new();
    let mut delay = Duration::from_millis(10);

    for attempt in 1..=max_retries {
        match client
            .get(format!("http://127.0.0.1:{}{}", port, HEALTH_PATH))
            .timeout(Duration::from_millis(100))
            .send()
            .await
        {
            Ok(_) => return client,
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_millis(200));
            }
            Err(e) => panic!("Server not ready after {} attempts: {}", max_retries, e),
        }
    }
    client
}

async fn spawn_api(
    port: u16,
    readiness: ReadinessState,
    health: HealthService,
) -> (ShutdownController, tokio::task::JoinHandle<Result<(), std::io::Error>>) {
    let (controller, signal) = shutdown_channel();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await.expect("bind API port");
    let handle = tokio::spawn(run_api_server(listener, readiness, health, signal));
    (controller, handle)
}

async fn get_report(client: &reqwest::Client, port: u16) -> (u16, HealthReport) {
    let response = client
        .get(format!("http://127.0.0.1:{}{}", port, HEALTH_PATH))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to API server");
    let status = response.status().as_u16();
    let report = response.json().await.expect("health report body");
    (status, report)
}

#[tokio::test]
async fn test_service_health_returns_200_when_ready_and_dependencies_ok() {
    // ARRANGE
    let readiness = ReadinessState::new();
    readiness.set_ready();
    let health = HealthService::new(vec![Arc::new(MockCheck::ok("PostgreSQL: schema `public`"))], true);
    let port = 18080;
    let (_controller, server) = spawn_api(port, readiness, health).await;
    let client = wait_for_server(port, 10).await;

    // ACT
    let (status, report) = get_report(&client, port).await;

    // ASSERT
    assert_eq!(status, 200);
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.deps.len(), 1);

    server.abort();
}

#[tokio::test]
async fn test_service_health_returns_503_when_dependency_fails() {
    // ARRANGE
    let readiness = ReadinessState::new();
    readiness.set_ready();
    let health = HealthService::new(
        vec![Arc::new(MockCheck::missing_schema("PostgreSQL: schema `auth`", "auth"))],
        true,
    );
    let port = 18081;
    let (_controller, server) = spawn_api(port, readiness, health).await;
    let client = wait_for_server(port, 10).await;

    // ACT
    let (status, report) = get_report(&client, port).await;

    // ASSERT
    assert_eq!(status, 503);
    assert_eq!(report.status, HealthStatus::Error);
    assert_eq!(report.deps[0].status, HealthStatus::Error);

    server.abort();
}

#[tokio::test]
async fn test_service_health_returns_503_before_ready_without_checking() {
    // ARRANGE: a check that would hang forever proves it is never run
    let readiness = ReadinessState::new();
    let health = HealthService::new(vec![Arc::new(MockCheck::hanging("db"))], true);
    let port = 18082;
    let (_controller, server) = spawn_api(port, readiness, health).await;
    let client = wait_for_server(port, 10).await;

    // ACT
    let (status, report) = get_report(&client, port).await;

    // ASSERT
    assert_eq!(status, 503);
    assert!(report.deps.is_empty());

    server.abort();
}

#[tokio::test]
async fn test_server_stops_and_clears_readiness_on_shutdown() {
    // ARRANGE
    let readiness = ReadinessState::new();
    readiness.set_ready();
    let health = HealthService::new(Vec::new(), true);
    let port = 18083;
    let (controller, server) = spawn_api(port, readiness.clone(), health).await;
    wait_for_server(port, 10).await;

    // ACT
    controller.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after shutdown");

    // ASSERT
    assert!(result.expect("server task").is_ok());
    assert!(!readiness.is_ready());
}

#[test]
fn test_readiness_state_transitions() {
    let state = ReadinessState::new();
    assert!(!state.is_ready());

    state.set_ready();
    assert!(state.is_ready());

    let clone = state.clone();
    clone.set_not_ready();
    assert!(!state.is_ready(), "clones share the flag");
}

/// A bound listener accepts connections before the server task runs, so
/// marking ready right after the bind never turns callers away
#[tokio::test]
async fn test_bound_listener_answers_first_request() {
    // ARRANGE
    let readiness = ReadinessState::new();
    let health = HealthService::new(vec![Arc::new(MockCheck::ok("PostgreSQL: schema `public`"))], true);
    let port = 18084;
    let (_controller, server) = spawn_api(port, readiness.clone(), health).await;
    readiness.set_ready();

    // ACT: no retry loop
    let (status, report) = get_report(&reqwest::Client::new(), port).await;

    // ASSERT
    assert_eq!(status, 200);
    assert_eq!(report.status, HealthStatus::Ok);

    server.abort();
}
