//! Tests for shutdown coordination

use super::shutdown::*;
use std::time::Duration;

#[tokio::test]
async fn test_signal_starts_not_shut_down() {
    let (_controller, signal) = shutdown_channel();
    assert!(!signal.is_shutdown());
}

#[tokio::test]
async fn test_wait_resolves_after_shutdown() {
    // ARRANGE
    let (controller, mut signal) = shutdown_channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
    });

    // ACT
    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;

    // ASSERT
    assert!(result.is_ok(), "wait() should resolve once shutdown is sent");
    assert!(signal.is_shutdown());
}

#[tokio::test]
async fn test_every_clone_observes_shutdown() {
    let (controller, signal) = shutdown_channel();
    let mut scheduler = signal.clone();
    let mut supervisor = signal.clone();

    controller.shutdown();

    scheduler.wait().await;
    supervisor.wait().await;
    assert!(signal.is_shutdown());
}

#[tokio::test]
async fn test_dropped_controller_releases_waiters() {
    let (controller, mut signal) = shutdown_channel();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok(), "a dropped controller counts as shutdown");
}
