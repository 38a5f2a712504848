//! Process health state, derived from a stream of probe results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::ProbePolicy;

/// Health of a supervised process as seen by its probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Started, no successful probe yet
    Starting,
    Healthy,
    /// Failed `retries` consecutive counted probes
    Unhealthy,
    /// Not running
    Stopped,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Starting => "starting",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Folds probe results into a [`HealthState`]
///
/// Failures inside the start period are ignored while the process is still
/// `Starting`. Once a probe has succeeded every failure counts, even inside
/// the start period.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    retries: u32,
    start_period: Duration,
    state: HealthState,
    failing_streak: u32,
}

impl HealthTracker {
    pub fn new(policy: &ProbePolicy) -> Self {
        Self {
            retries: policy.retries.max(1),
            start_period: policy.start_period,
            state: HealthState::Starting,
            failing_streak: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn failing_streak(&self) -> u32 {
        self.failing_streak
    }

    /// Record one probe result
    ///
    /// # Arguments
    /// * `success` - Whether the probe passed
    /// * `since_start` - Time elapsed since the process was started
    pub fn record(&mut self, success: bool, since_start: Duration) -> HealthState {
        if success {
            self.failing_streak = 0;
            self.state = HealthState::Healthy;
            return self.state;
        }

        let in_grace = self.state == HealthState::Starting && since_start < self.start_period;
        if in_grace {
            return self.state;
        }

        self.failing_streak = self.failing_streak.saturating_add(1);
        if self.failing_streak >= self.retries {
            self.state = HealthState::Unhealthy;
        }
        self.state
    }
}
