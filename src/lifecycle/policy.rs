//! Restart policy state machine
//!
//! ```text
//! created ──start──▶ running ──exit / unhealthy──▶ crashed
//!                       ▲                             │ policy permits,
//!                       │                             │ not manually stopped
//!                       └──────── restarting ◀────────┘
//!
//! any state ──stop──▶ manually-stopped ──explicit start──▶ restarting
//! ```
//!
//! `manually-stopped` has no automatic way out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// When a crashed process is started again (compose vocabulary)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart automatically
    No,
    /// Restart after every exit
    Always,
    /// Restart only after a failure (non-zero exit, launch failure, liveness failure)
    OnFailure,
    /// Restart after every exit unless the process was explicitly stopped
    ///
    /// Within one supervisor run this behaves like `Always`, since a manual
    /// stop suppresses restarts under every policy.
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    pub fn permits_restart(&self, reason: &ExitReason) -> bool {
        match self {
            RestartPolicy::No => false,
            RestartPolicy::Always | RestartPolicy::UnlessStopped => true,
            RestartPolicy::OnFailure => !reason.is_clean(),
        }
    }
}

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    /// Defined, never started
    Created,
    Running,
    Crashed,
    Restarting,
    ManuallyStopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Created => "created",
            ProcessState::Running => "running",
            ProcessState::Crashed => "crashed",
            ProcessState::Restarting => "restarting",
            ProcessState::ManuallyStopped => "manually-stopped",
        };
        f.write_str(name)
    }
}

/// Why a process left the `running` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The process exited on its own; `None` when killed by a signal
    Exited { code: Option<i32> },
    /// Liveness probes failed past the threshold
    Unhealthy,
    /// The process could not be spawned
    LaunchFailed(String),
    /// A dependency never passed its readiness gate
    DependencyFailed(String),
}

impl ExitReason {
    /// Exit code 0
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::Exited { code: Some(0) })
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Exited { code: Some(code) } => write!(f, "exited with code {}", code),
            ExitReason::Exited { code: None } => f.write_str("killed by signal"),
            ExitReason::Unhealthy => f.write_str("health checks failed"),
            ExitReason::LaunchFailed(e) => write!(f, "launch failed: {}", e),
            ExitReason::DependencyFailed(dep) => write!(f, "dependency {} unhealthy", dep),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid transition {event} from state {from}")]
pub struct TransitionError {
    pub from: ProcessState,
    pub event: &'static str,
}

/// Exponential restart delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Delay before the n-th consecutive restart (0-based)
    pub fn delay(&self, consecutive: u32) -> Duration {
        let factor = 1u32 << consecutive.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Per-process restart state machine
#[derive(Debug, Clone)]
pub struct RestartMachine {
    policy: RestartPolicy,
    state: ProcessState,
    restarts: u32,
    consecutive_restarts: u32,
}

impl RestartMachine {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            state: ProcessState::Created,
            restarts: 0,
            consecutive_restarts: 0,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn policy(&self) -> RestartPolicy {
        self.policy
    }

    /// Total automatic and manual restarts
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Restarts since the process last reported healthy
    pub fn consecutive_restarts(&self) -> u32 {
        self.consecutive_restarts
    }

    /// The process was spawned
    pub fn on_started(&mut self) -> Result<ProcessState, TransitionError> {
        match self.state {
            ProcessState::Created | ProcessState::Restarting => {
                self.state = ProcessState::Running;
                Ok(self.state)
            }
            from => Err(TransitionError {
                from,
                event: "started",
            }),
        }
    }

    /// The process stopped running without being asked to
    pub fn on_crash(&mut self) -> Result<ProcessState, TransitionError> {
        match self.state {
            // a start attempt that never reached running also counts as a crash
            ProcessState::Running | ProcessState::Created | ProcessState::Restarting => {
                self.state = ProcessState::Crashed;
                Ok(self.state)
            }
            from => Err(TransitionError {
                from,
                event: "crash",
            }),
        }
    }

    /// The process proved stable (healthy probe or long uptime)
    pub fn reset_backoff(&mut self) {
        self.consecutive_restarts = 0;
    }

    /// Whether the policy allows an automatic restart after `reason`
    pub fn should_restart(&self, reason: &ExitReason) -> bool {
        self.state == ProcessState::Crashed
            && !matches!(reason, ExitReason::DependencyFailed(_))
            && self.policy.permits_restart(reason)
    }

    /// Automatic `crashed -> restarting`
    pub fn begin_restart(&mut self, reason: &ExitReason) -> Result<ProcessState, TransitionError> {
        if !self.should_restart(reason) {
            return Err(TransitionError {
                from: self.state,
                event: "automatic restart",
            });
        }
        self.state = ProcessState::Restarting;
        self.restarts += 1;
        self.consecutive_restarts += 1;
        Ok(self.state)
    }

    /// Explicit external stop, allowed from any state
    pub fn stop(&mut self) -> ProcessState {
        self.state = ProcessState::ManuallyStopped;
        self.state
    }

    /// Explicit external start out of `manually-stopped` or `crashed`
    pub fn start(&mut self) -> Result<ProcessState, TransitionError> {
        match self.state {
            ProcessState::ManuallyStopped | ProcessState::Crashed => {
                self.state = ProcessState::Restarting;
                self.restarts += 1;
                self.consecutive_restarts = 0;
                Ok(self.state)
            }
            from => Err(TransitionError {
                from,
                event: "manual start",
            }),
        }
    }
}
