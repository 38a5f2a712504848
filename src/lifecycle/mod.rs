//! Service lifecycle: probes, readiness gating, liveness, restart policy
//!
//! - `probe` - exec/http/tcp probes behind the `Probe` trait
//! - `gate` - holds a dependent back until its dependency is ready
//! - `monitor` / `state` - liveness probing of a running process
//! - `policy` - restart state machine
//! - `supervisor` - ties it together, one task per service

pub mod clock;
pub mod gate;
pub mod monitor;
pub mod policy;
pub mod probe;
pub mod process;
pub mod state;
pub mod status;
pub mod supervisor;

pub use clock::{Clock, SystemClock};
pub use gate::{GateError, ReadinessGate};
pub use monitor::LivenessMonitor;
pub use policy::{Backoff, ExitReason, ProcessState, RestartMachine, RestartPolicy, TransitionError};
pub use probe::{probe_for, run_probe, Probe, ProbeError, ProbePolicy};
pub use process::{CommandLauncher, LaunchError, Launcher, ProcessHandle};
pub use state::{HealthState, HealthTracker};
pub use status::{ServiceStatus, StatusBoard};
pub use supervisor::{
    ControlCommand, Controls, ManagedService, Supervisor, SupervisorError, SupervisorHandle,
};

#[cfg(test)]
#[path = "gate_test.rs"]
mod gate_tests;

#[cfg(test)]
#[path = "policy_test.rs"]
mod policy_tests;

#[cfg(test)]
#[path = "state_test.rs"]
mod state_tests;

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_tests;
