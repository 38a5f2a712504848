//! Spawning and stopping supervised processes
//!
//! - `CommandLauncher`: real OS processes through `tokio::process`
//! - `MockLauncher`: in-memory processes for tests

use super::policy::ExitReason;
use crate::config::ServiceDefinition;
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Service {0} has no command")]
    EmptyCommand(String),

    #[error("Failed to spawn {service}: {source}")]
    Spawn {
        service: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running process owned by the supervisor
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit on its own
    async fn wait(&mut self) -> ExitReason;

    /// Stop the process immediately; in-flight work is not drained
    async fn terminate(&mut self);
}

/// Trait for starting processes
///
/// Production code uses `CommandLauncher`.
/// Tests use `MockLauncher` which records launches in an event log.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}

/// Launches services as child processes
///
/// Children inherit the supervisor's stdout/stderr, so their logs end up in
/// the same stream.
pub struct CommandLauncher;

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let (program, args) = service
            .command
            .split_first()
            .ok_or_else(|| LaunchError::EmptyCommand(service.name.clone()))?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .envs(&service.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &service.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            service: service.name.clone(),
            source,
        })?;
        debug!(service = %service.name, pid = ?child.id(), "Spawned process");

        Ok(Box::new(ChildProcess {
            name: service.name.clone(),
            child,
        }))
    }
}

struct ChildProcess {
    name: String,
    child: tokio::process::Child,
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> ExitReason {
        match self.child.wait().await {
            Ok(status) => ExitReason::Exited {
                code: status.code(),
            },
            Err(e) => {
                warn!(service = %self.name, error = %e, "Failed to wait for process");
                ExitReason::Exited { code: None }
            }
        }
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            // already exited
            debug!(service = %self.name, error = %e, "Kill failed");
        }
    }
}

/// Mock launcher for testing
///
/// Logs `launch:<name>` and `terminate:<name>` to the event log. Processes
/// run until [`MockLauncher::exit`] is called or they are terminated.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockLauncher {
    log: super::probe::EventLog,
    exits: std::sync::Mutex<
        std::collections::HashMap<String, tokio::sync::watch::Sender<Option<Option<i32>>>>,
    >,
    failing: std::sync::Mutex<std::collections::HashSet<String>>,
    next_pid: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockLauncher {
    pub fn new(log: super::probe::EventLog) -> Self {
        Self {
            log,
            exits: Default::default(),
            failing: Default::default(),
            next_pid: std::sync::atomic::AtomicU32::new(1000),
        }
    }

    /// Make the latest process of `name` exit with `code`
    pub fn exit(&self, name: &str, code: Option<i32>) {
        if let Some(tx) = self.exits.lock().expect("exits lock").get(name) {
            let _ = tx.send(Some(code));
        }
    }

    /// Make every future launch of `name` fail
    pub fn fail_launches(&self, name: &str) {
        self.failing.lock().expect("failing lock").insert(name.to_string());
    }

    pub fn launches(&self, name: &str) -> usize {
        let wanted = format!("launch:{}", name);
        self.log
            .lock()
            .expect("event log poisoned")
            .iter()
            .filter(|e| **e == wanted)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        if self.failing.lock().expect("failing lock").contains(&service.name) {
            return Err(LaunchError::Spawn {
                service: service.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock launch failure"),
            });
        }

        self.log
            .lock()
            .expect("event log poisoned")
            .push(format!("launch:{}", service.name));

        let (tx, rx) = tokio::sync::watch::channel(None);
        self.exits
            .lock()
            .expect("exits lock")
            .insert(service.name.clone(), tx);

        Ok(Box::new(MockProcess {
            name: service.name.clone(),
            pid: self
                .next_pid
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
            exit: rx,
            log: self.log.clone(),
        }))
    }
}

#[cfg(test)]
struct MockProcess {
    name: String,
    pid: u32,
    exit: tokio::sync::watch::Receiver<Option<Option<i32>>>,
    log: super::probe::EventLog,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[async_trait]
impl ProcessHandle for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> ExitReason {
        let exit = match self.exit.wait_for(|v| v.is_some()).await {
            Ok(code) => *code,
            Err(_) => None,
        };
        match exit {
            Some(code) => ExitReason::Exited { code },
            // launcher dropped
            None => std::future::pending().await,
        }
    }

    async fn terminate(&mut self) {
        self.log
            .lock()
            .expect("event log poisoned")
            .push(format!("terminate:{}", self.name));
    }
}
