//! Per-service status published by the supervisor
//!
//! One `watch` channel per service: the service task is the only writer,
//! the control surface and dependent services read.

use super::policy::ProcessState;
use super::state::HealthState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ProcessState,
    pub health: HealthState,
    pub restarts: u32,
    pub pid: Option<u32>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_exit: Option<String>,
    /// Monotonic start of the current run, `None` unless running
    #[serde(skip)]
    pub running_since: Option<Instant>,
}

impl ServiceStatus {
    fn new(name: String) -> Self {
        Self {
            name,
            state: ProcessState::Created,
            health: HealthState::Stopped,
            restarts: 0,
            pid: None,
            last_started_at: None,
            last_exit: None,
            running_since: None,
        }
    }
}

#[derive(Clone)]
pub struct StatusBoard {
    services: Arc<BTreeMap<String, watch::Sender<ServiceStatus>>>,
}

impl StatusBoard {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let services = names
            .into_iter()
            .map(|name| {
                let (tx, _rx) = watch::channel(ServiceStatus::new(name.clone()));
                (name, tx)
            })
            .collect();
        Self {
            services: Arc::new(services),
        }
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.services.get(name).map(|tx| tx.borrow().clone())
    }

    /// Snapshot of every service, ordered by name
    pub fn all(&self) -> Vec<ServiceStatus> {
        self.services.values().map(|tx| tx.borrow().clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn update<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut ServiceStatus),
    {
        if let Some(tx) = self.services.get(name) {
            tx.send_modify(f);
        }
    }

    /// Wait until `name` has a running process
    ///
    /// Returns when the current run started, or `None` for an unknown
    /// service.
    pub async fn wait_running(&self, name: &str) -> Option<Instant> {
        let tx = self.services.get(name)?;
        let mut rx = tx.subscribe();
        let since = match rx
            .wait_for(|status| {
                status.state == ProcessState::Running && status.running_since.is_some()
            })
            .await
        {
            Ok(status) => status.running_since,
            Err(_) => None,
        };
        since
    }

    /// Wait until the run of `name` that started at `since` is over
    pub async fn wait_run_ended(&self, name: &str, since: Instant) {
        let Some(tx) = self.services.get(name) else {
            return;
        };
        let mut rx = tx.subscribe();
        let _ = rx
            .wait_for(|status| {
                status.state != ProcessState::Running || status.running_since != Some(since)
            })
            .await;
    }
}
