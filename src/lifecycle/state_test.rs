//! Tests for the liveness health tracker

use super::probe::ProbePolicy;
use super::state::*;
use std::time::Duration;

fn policy(retries: u32, start_period_secs: u64) -> ProbePolicy {
    ProbePolicy {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(5),
        retries,
        start_period: Duration::from_secs(start_period_secs),
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[test]
fn test_new_tracker_is_starting() {
    let tracker = HealthTracker::new(&policy(3, 0));
    assert_eq!(tracker.state(), HealthState::Starting);
    assert_eq!(tracker.failing_streak(), 0);
}

#[test]
fn test_unhealthy_after_retries_consecutive_failures() {
    let mut tracker = HealthTracker::new(&policy(3, 0));

    assert_eq!(tracker.record(false, secs(10)), HealthState::Starting);
    assert_eq!(tracker.record(false, secs(20)), HealthState::Starting);
    assert_eq!(tracker.record(false, secs(30)), HealthState::Unhealthy);
    assert_eq!(tracker.failing_streak(), 3);
}

#[test]
fn test_success_resets_failing_streak() {
    let mut tracker = HealthTracker::new(&policy(3, 0));

    tracker.record(false, secs(10));
    tracker.record(false, secs(20));
    assert_eq!(tracker.record(true, secs(30)), HealthState::Healthy);
    assert_eq!(tracker.failing_streak(), 0);

    // streak starts over
    assert_eq!(tracker.record(false, secs(40)), HealthState::Healthy);
    assert_eq!(tracker.record(false, secs(50)), HealthState::Healthy);
    assert_eq!(tracker.record(false, secs(60)), HealthState::Unhealthy);
}

#[test]
fn test_failures_inside_start_period_are_ignored_while_starting() {
    let mut tracker = HealthTracker::new(&policy(3, 40));

    for t in [10, 20, 30] {
        assert_eq!(tracker.record(false, secs(t)), HealthState::Starting);
    }
    assert_eq!(tracker.failing_streak(), 0);

    // counted from the end of the start period on
    tracker.record(false, secs(40));
    tracker.record(false, secs(50));
    assert_eq!(tracker.record(false, secs(60)), HealthState::Unhealthy);
}

#[test]
fn test_failures_count_inside_start_period_once_healthy() {
    let mut tracker = HealthTracker::new(&policy(2, 60));

    tracker.record(true, secs(10));
    assert_eq!(tracker.record(false, secs(20)), HealthState::Healthy);
    assert_eq!(tracker.record(false, secs(30)), HealthState::Unhealthy);
}

#[test]
fn test_zero_retries_behaves_like_one() {
    let mut tracker = HealthTracker::new(&policy(0, 0));
    assert_eq!(tracker.record(false, secs(10)), HealthState::Unhealthy);
}

#[test]
fn test_health_state_display_and_serialize() {
    assert_eq!(HealthState::Starting.to_string(), "starting");
    assert_eq!(
        serde_json::to_string(&HealthState::Unhealthy).expect("serialize"),
        "\"unhealthy\""
    );
}
