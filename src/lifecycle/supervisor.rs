//! The supervisor: start services in dependency order, gate each start on
//! the readiness of its dependencies, watch liveness, apply restart policies
//!
//! Every service is driven by its own task. Tasks share nothing but the
//! [`StatusBoard`] (read by dependents and the control surface) and a command
//! channel per service (written by the control surface).

use super::clock::Clock;
use super::gate::ReadinessGate;
use super::monitor::LivenessMonitor;
use super::policy::{Backoff, ExitReason, ProcessState, RestartMachine};
use super::probe::{probe_for, Probe, ProbePolicy};
use super::process::{Launcher, ProcessHandle};
use super::state::HealthState;
use super::status::StatusBoard;
use crate::config::{ConfigError, ServiceDefinition, Topology};
use crate::server::{ShutdownSignal, SharedMetrics};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service {0} is no longer supervised")]
    Closed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A process that stayed up this long restarts with the initial backoff
const STABLE_UPTIME: Duration = Duration::from_secs(10);

/// External actions on a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Stop,
    Start,
}

/// A service definition plus its probe, if it has a healthcheck
pub struct ManagedService {
    pub definition: ServiceDefinition,
    pub probe: Option<(Arc<dyn Probe>, ProbePolicy)>,
}

impl ManagedService {
    /// Build the production probe from the definition's healthcheck
    pub fn from_definition(definition: ServiceDefinition) -> Self {
        let probe = definition
            .healthcheck
            .as_ref()
            .map(|check| (probe_for(&check.test, check.timeout), check.policy()));
        Self { definition, probe }
    }

    pub fn with_probe(
        definition: ServiceDefinition,
        probe: Arc<dyn Probe>,
        policy: ProbePolicy,
    ) -> Self {
        Self {
            definition,
            probe: Some((probe, policy)),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

pub struct Supervisor {
    services: Vec<Arc<ManagedService>>,
    launcher: Arc<dyn Launcher>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    metrics: Option<SharedMetrics>,
    board: StatusBoard,
}

impl Supervisor {
    /// Build a supervisor for a validated topology
    pub fn from_topology(
        topology: &Topology,
        launcher: Arc<dyn Launcher>,
        clock: Arc<dyn Clock>,
        metrics: Option<SharedMetrics>,
    ) -> Result<Self, SupervisorError> {
        let services = topology
            .startup_order()?
            .into_iter()
            .cloned()
            .map(ManagedService::from_definition)
            .collect();
        let backoff = Backoff {
            base: topology.supervisor.restart_backoff,
            max: topology.supervisor.restart_backoff_max,
        };
        Ok(Self::new(services, launcher, clock, backoff, metrics))
    }

    /// Build a supervisor from services already in startup order
    pub fn new(
        services: Vec<ManagedService>,
        launcher: Arc<dyn Launcher>,
        clock: Arc<dyn Clock>,
        backoff: Backoff,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        let board = StatusBoard::new(services.iter().map(|s| s.name().to_string()));
        Self {
            services: services.into_iter().map(Arc::new).collect(),
            launcher,
            clock,
            backoff,
            metrics,
            board,
        }
    }

    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Start one task per service, in startup order
    pub fn spawn(self, shutdown: ShutdownSignal) -> SupervisorHandle {
        let by_name: HashMap<String, Arc<ManagedService>> = self
            .services
            .iter()
            .map(|s| (s.name().to_string(), s.clone()))
            .collect();

        let mut senders = HashMap::new();
        let mut tasks = Vec::with_capacity(self.services.len());

        for service in &self.services {
            let (tx, rx) = mpsc::channel(8);
            senders.insert(service.name().to_string(), tx);

            let deps = service
                .definition
                .depends_on
                .iter()
                .filter_map(|d| by_name.get(d).cloned())
                .collect();

            let runner = ServiceRunner {
                service: service.clone(),
                deps,
                launcher: self.launcher.clone(),
                clock: self.clock.clone(),
                backoff: self.backoff,
                metrics: self.metrics.clone(),
                board: self.board.clone(),
                commands: rx,
                shutdown: shutdown.clone(),
                machine: RestartMachine::new(service.definition.restart),
            };

            info!(service = %service.name(), "Supervising service");
            tasks.push(tokio::spawn(runner.run()));
        }

        SupervisorHandle {
            controls: Controls {
                senders: Arc::new(senders),
            },
            board: self.board,
            tasks,
        }
    }
}

/// Sends control commands to service tasks
#[derive(Clone)]
pub struct Controls {
    senders: Arc<HashMap<String, mpsc::Sender<ControlCommand>>>,
}

impl Controls {
    pub async fn send(&self, service: &str, command: ControlCommand) -> Result<(), SupervisorError> {
        let sender = self
            .senders
            .get(service)
            .ok_or_else(|| SupervisorError::UnknownService(service.to_string()))?;
        sender
            .send(command)
            .await
            .map_err(|_| SupervisorError::Closed(service.to_string()))
    }

    pub async fn stop(&self, service: &str) -> Result<(), SupervisorError> {
        self.send(service, ControlCommand::Stop).await
    }

    pub async fn start(&self, service: &str) -> Result<(), SupervisorError> {
        self.send(service, ControlCommand::Start).await
    }
}

pub struct SupervisorHandle {
    controls: Controls,
    board: StatusBoard,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn controls(&self) -> Controls {
        self.controls.clone()
    }

    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Wait for every service task to finish (after shutdown)
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Service task panicked");
            }
        }
    }
}

/// What ended a supervised run
enum Outcome {
    Exited(ExitReason),
    Unhealthy,
    Stop,
    Shutdown,
}

/// Result of waiting on the readiness gates
enum GateOutcome {
    Ready,
    Failed(ExitReason),
    Stop,
    Shutdown,
}

struct ServiceRunner {
    service: Arc<ManagedService>,
    deps: Vec<Arc<ManagedService>>,
    launcher: Arc<dyn Launcher>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    metrics: Option<SharedMetrics>,
    board: StatusBoard,
    commands: mpsc::Receiver<ControlCommand>,
    shutdown: ShutdownSignal,
    machine: RestartMachine,
}

impl ServiceRunner {
    fn name(&self) -> &str {
        self.service.name()
    }

    async fn run(mut self) {
        loop {
            let reason = match self.await_dependencies().await {
                GateOutcome::Ready => match self.launcher.launch(&self.service.definition).await {
                    Ok(mut handle) => match self.supervise(handle.as_mut()).await {
                        Outcome::Exited(reason) => reason,
                        Outcome::Unhealthy => {
                            handle.terminate().await;
                            ExitReason::Unhealthy
                        }
                        Outcome::Stop => {
                            handle.terminate().await;
                            self.mark_stopped();
                            if self.park().await {
                                continue;
                            }
                            return;
                        }
                        Outcome::Shutdown => {
                            handle.terminate().await;
                            self.mark_stopped();
                            return;
                        }
                    },
                    Err(e) => {
                        error!(service = %self.name(), error = %e, "Failed to launch service");
                        ExitReason::LaunchFailed(e.to_string())
                    }
                },
                GateOutcome::Failed(reason) => reason,
                GateOutcome::Stop => {
                    self.mark_stopped();
                    if self.park().await {
                        continue;
                    }
                    return;
                }
                GateOutcome::Shutdown => {
                    self.mark_stopped();
                    return;
                }
            };

            if !self.after_crash(reason).await {
                return;
            }
        }
    }

    /// Wait until every dependency is running and passes its readiness probe
    async fn await_dependencies(&mut self) -> GateOutcome {
        for dep in self.deps.clone() {
            info!(
                service = %self.service.name(),
                dependency = %dep.name(),
                "Waiting for dependency to become ready"
            );

            let outcome = tokio::select! {
                result = gate_dependency(&self.board, &dep) => match result {
                    Ok(()) => GateOutcome::Ready,
                    Err(reason) => GateOutcome::Failed(reason),
                },
                stop = next_stop(&mut self.commands) => {
                    if stop { GateOutcome::Stop } else { GateOutcome::Shutdown }
                }
                _ = self.shutdown.wait() => GateOutcome::Shutdown,
            };

            if !matches!(outcome, GateOutcome::Ready) {
                return outcome;
            }
        }
        GateOutcome::Ready
    }

    /// Watch a launched process until it exits, turns unhealthy, or is
    /// stopped
    async fn supervise(&mut self, handle: &mut dyn ProcessHandle) -> Outcome {
        let started = Instant::now();
        if let Err(e) = self.machine.on_started() {
            warn!(service = %self.service.name(), error = %e, "Unexpected start transition");
        }

        let initial_health = if self.service.probe.is_some() {
            HealthState::Starting
        } else {
            HealthState::Healthy
        };
        let pid = handle.id();
        let now = self.clock.now();
        let restarts = self.machine.restarts();
        self.board.update(self.service.name(), |s| {
            s.state = ProcessState::Running;
            s.health = initial_health;
            s.pid = pid;
            s.restarts = restarts;
            s.last_started_at = Some(now);
            s.running_since = Some(started);
        });
        if let Some(metrics) = &self.metrics {
            metrics.set_up(self.service.name(), true);
        }
        info!(service = %self.service.name(), pid = ?pid, "Service started");

        let Self {
            service,
            board,
            metrics,
            machine,
            commands,
            shutdown,
            ..
        } = self;
        let name = service.name().to_string();
        let metrics = metrics.as_ref();
        let board = &*board;

        let liveness = async {
            match &service.probe {
                Some((probe, policy)) => {
                    let monitor = LivenessMonitor::new(name.clone(), probe.clone(), *policy);
                    monitor
                        .watch(started, |state, error| {
                            if error.is_some() {
                                if let Some(metrics) = metrics {
                                    metrics.record_probe_failure(&name);
                                }
                            }
                            if state == HealthState::Healthy {
                                machine.reset_backoff();
                            }
                            board.update(&name, |s| s.health = state);
                        })
                        .await
                }
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            reason = handle.wait() => Outcome::Exited(reason),
            _ = liveness => Outcome::Unhealthy,
            stop = next_stop(commands) => if stop { Outcome::Stop } else { Outcome::Shutdown },
            _ = shutdown.wait() => Outcome::Shutdown,
        };

        if started.elapsed() >= STABLE_UPTIME {
            machine.reset_backoff();
        }
        outcome
    }

    /// Handle a crash; returns `false` when the task should end
    async fn after_crash(&mut self, reason: ExitReason) -> bool {
        if let Err(e) = self.machine.on_crash() {
            warn!(service = %self.name(), error = %e, "Unexpected crash transition");
        }
        let description = reason.to_string();
        self.board.update(self.service.name(), |s| {
            s.state = ProcessState::Crashed;
            s.health = HealthState::Stopped;
            s.pid = None;
            s.running_since = None;
            s.last_exit = Some(description.clone());
        });
        if let Some(metrics) = &self.metrics {
            metrics.set_up(self.service.name(), false);
        }

        if !self.machine.should_restart(&reason) {
            warn!(
                service = %self.name(),
                reason = %reason,
                policy = ?self.machine.policy(),
                "Service crashed, not restarting automatically"
            );
            return self.park().await;
        }

        let delay = self.backoff.delay(self.machine.consecutive_restarts());
        if let Err(e) = self.machine.begin_restart(&reason) {
            warn!(service = %self.name(), error = %e, "Unexpected restart transition");
            return self.park().await;
        }
        self.mark_restarting();
        warn!(
            service = %self.name(),
            reason = %reason,
            delay = ?delay,
            restarts = self.machine.restarts(),
            "Service crashed, restarting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            stop = next_stop(&mut self.commands) => {
                if !stop {
                    return false;
                }
                self.mark_stopped();
                self.park().await
            }
            _ = self.shutdown.wait() => {
                self.mark_stopped();
                false
            }
        }
    }

    /// Idle in `crashed` or `manually-stopped` until an explicit start
    ///
    /// Returns `true` when started again, `false` on shutdown.
    async fn park(&mut self) -> bool {
        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,
                _ = self.shutdown.wait() => return false,
            };

            match command {
                Some(ControlCommand::Start) => match self.machine.start() {
                    Ok(_) => {
                        info!(service = %self.name(), "Service started manually");
                        self.mark_restarting();
                        return true;
                    }
                    Err(e) => debug!(service = %self.name(), error = %e, "Ignoring start"),
                },
                Some(ControlCommand::Stop) => self.mark_stopped(),
                None => {
                    self.shutdown.wait().await;
                    return false;
                }
            }
        }
    }

    fn mark_stopped(&mut self) {
        let state = self.machine.stop();
        self.board.update(self.service.name(), |s| {
            s.state = state;
            s.health = HealthState::Stopped;
            s.pid = None;
            s.running_since = None;
        });
        if let Some(metrics) = &self.metrics {
            metrics.set_up(self.service.name(), false);
        }
        info!(service = %self.service.name(), "Service stopped");
    }

    fn mark_restarting(&self) {
        let restarts = self.machine.restarts();
        self.board.update(self.service.name(), |s| {
            s.state = ProcessState::Restarting;
            s.restarts = restarts;
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_restart(self.service.name());
        }
    }
}

/// Wait for a stop command, ignoring redundant starts
///
/// Returns `true` on stop, `false` when the command channel is closed.
async fn next_stop(commands: &mut mpsc::Receiver<ControlCommand>) -> bool {
    loop {
        match commands.recv().await {
            Some(ControlCommand::Stop) => return true,
            Some(ControlCommand::Start) => debug!("Ignoring start for an active service"),
            None => return std::future::pending().await,
        }
    }
}

/// Readiness gate for one dependency
///
/// The start period counts from when the dependency's current run started.
/// If that run ends while the gate is waiting, the gate waits for the next one.
async fn gate_dependency(board: &StatusBoard, dep: &ManagedService) -> Result<(), ExitReason> {
    loop {
        let Some(since) = board.wait_running(dep.name()).await else {
            return Ok(());
        };
        let Some((probe, policy)) = &dep.probe else {
            return Ok(());
        };

        let gate = ReadinessGate::new(dep.name(), probe.clone(), *policy);
        tokio::select! {
            result = gate.wait_ready_since(since) => {
                return result.map(|_| ()).map_err(|e| {
                    error!(dependency = %dep.name(), error = %e, "Dependency failed readiness gate");
                    ExitReason::DependencyFailed(dep.name().to_string())
                });
            }
            _ = board.wait_run_ended(dep.name(), since) => {
                info!(dependency = %dep.name(), "Dependency stopped running, waiting for it again");
            }
        }
    }
}
