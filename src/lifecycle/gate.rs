//! Readiness gate: hold a dependent process back until its dependency
//! passes a probe
//!
//! The first probe runs immediately, then one probe per interval. Failures
//! inside the target's start period are not counted. The gate gives up when a counted
//! failure exceeds the retry budget, i.e. after one initial attempt plus
//! `retries` retries.
//!
//! The gate only governs start ordering: once it has released the
//! dependent, later failures of the dependency are not its concern.

use super::probe::{run_probe, Probe, ProbePolicy};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("{target} did not become ready after {attempts} probes: {last_error}")]
    Unhealthy {
        target: String,
        attempts: u32,
        last_error: String,
    },
}

pub struct ReadinessGate {
    target: String,
    probe: Arc<dyn Probe>,
    policy: ProbePolicy,
}

impl ReadinessGate {
    pub fn new(target: impl Into<String>, probe: Arc<dyn Probe>, policy: ProbePolicy) -> Self {
        Self {
            target: target.into(),
            probe,
            policy,
        }
    }

    /// Probe until the target is ready or the retry budget is exhausted
    ///
    /// Dropping the returned future cancels the wait.
    ///
    /// # Returns
    /// * `Ok(attempts)` - Number of probes it took, including the successful one
    /// * `Err(GateError::Unhealthy)` - The dependent must not start
    pub async fn wait_ready(&self) -> Result<u32, GateError> {
        self.wait_ready_since(Instant::now()).await
    }

    /// Like [`wait_ready`](Self::wait_ready), with the start period
    /// measured from `started`, when the target process came up
    pub async fn wait_ready_since(&self, started: Instant) -> Result<u32, GateError> {
        let mut attempts = 0u32;
        let mut counted_failures = 0u32;

        loop {
            attempts += 1;
            match run_probe(self.probe.as_ref(), self.policy.timeout).await {
                Ok(()) => {
                    info!(
                        target_service = %self.target,
                        attempts,
                        "Readiness probe passed, releasing dependents"
                    );
                    return Ok(attempts);
                }
                Err(e) => {
                    if started.elapsed() >= self.policy.start_period {
                        counted_failures += 1;
                    }

                    if counted_failures > self.policy.retries {
                        warn!(
                            target_service = %self.target,
                            attempts,
                            error = %e,
                            "Readiness retries exhausted, dependency is unhealthy"
                        );
                        return Err(GateError::Unhealthy {
                            target: self.target.clone(),
                            attempts,
                            last_error: e.to_string(),
                        });
                    }

                    debug!(
                        target_service = %self.target,
                        probe = %self.probe.describe(),
                        attempts,
                        counted_failures,
                        error = %e,
                        "Readiness probe failed, will retry"
                    );
                }
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }
}
