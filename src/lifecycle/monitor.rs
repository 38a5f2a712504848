//! Liveness monitor: periodic probing of a running process

use super::probe::{run_probe, Probe, ProbeError, ProbePolicy};
use super::state::{HealthState, HealthTracker};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct LivenessMonitor {
    target: String,
    probe: Arc<dyn Probe>,
    policy: ProbePolicy,
}

impl LivenessMonitor {
    pub fn new(target: impl Into<String>, probe: Arc<dyn Probe>, policy: ProbePolicy) -> Self {
        Self {
            target: target.into(),
            probe,
            policy,
        }
    }

    /// Probe every interval until the process turns unhealthy
    ///
    /// The first probe runs one interval after `started`. `report` sees the
    /// state after every probe, with the probe error if it failed.
    /// Returns once the state is [`HealthState::Unhealthy`]; never returns
    /// while the process stays healthy.
    pub async fn watch<F>(&self, started: Instant, mut report: F)
    where
        F: FnMut(HealthState, Option<&ProbeError>),
    {
        let mut tracker = HealthTracker::new(&self.policy);
        let mut next = started + self.policy.interval;

        loop {
            tokio::time::sleep_until(next).await;
            next += self.policy.interval;

            let result = run_probe(self.probe.as_ref(), self.policy.timeout).await;
            let state = tracker.record(result.is_ok(), started.elapsed());
            report(state, result.as_ref().err());

            match (&result, state) {
                (_, HealthState::Unhealthy) => {
                    warn!(
                        service = %self.target,
                        failing_streak = tracker.failing_streak(),
                        "Liveness threshold reached, service is unhealthy"
                    );
                    return;
                }
                (Err(e), _) => {
                    debug!(
                        service = %self.target,
                        probe = %self.probe.describe(),
                        failing_streak = tracker.failing_streak(),
                        error = %e,
                        "Liveness probe failed"
                    );
                }
                (Ok(()), _) => {}
            }
        }
    }
}
