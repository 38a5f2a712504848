//! Supervisor topology: which services run, how they are probed, and in
//! what order they start
//!
//! ## Example
//! ```toml
//! [supervisor]
//! control_port = 9000
//!
//! [[services]]
//! name = "db"
//! command = ["postgres", "-D", "/var/lib/postgresql/data"]
//! restart = "unless-stopped"
//!
//! [services.healthcheck]
//! test = { exec = ["pg_isready", "-U", "auth"] }
//! interval = "5s"
//! timeout = "5s"
//! retries = 5
//!
//! [[services]]
//! name = "api"
//! command = ["warden"]
//! depends_on = ["db"]
//!
//! [services.healthcheck]
//! test = { http = "http://127.0.0.1:8000/api/health/service_health" }
//! interval = "10s"
//! retries = 3
//! start_period = "40s"
//! ```

use super::duration;
use super::ConfigError;
use crate::lifecycle::{ProbePolicy, RestartPolicy};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port for the supervisor control surface
pub const DEFAULT_CONTROL_PORT: u16 = 9000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSettings {
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// First restart delay; doubles per consecutive restart
    #[serde(
        default = "default_restart_backoff",
        deserialize_with = "duration::deserialize"
    )]
    pub restart_backoff: Duration,

    #[serde(
        default = "default_restart_backoff_max",
        deserialize_with = "duration::deserialize"
    )]
    pub restart_backoff_max: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            restart_backoff: default_restart_backoff(),
            restart_backoff_max: default_restart_backoff_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,

    /// Program followed by its arguments
    pub command: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Services that must pass their readiness probe before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub healthcheck: Option<HealthcheckDefinition>,
}

/// Probe configuration, mirroring compose `healthcheck` semantics
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckDefinition {
    pub test: ProbeTarget,

    #[serde(default = "default_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,

    #[serde(default = "default_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(
        default = "default_start_period",
        deserialize_with = "duration::deserialize"
    )]
    pub start_period: Duration,
}

impl HealthcheckDefinition {
    pub fn policy(&self) -> ProbePolicy {
        ProbePolicy {
            interval: self.interval,
            timeout: self.timeout,
            retries: self.retries,
            start_period: self.start_period,
        }
    }
}

/// What a probe talks to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ProbeTarget {
    /// Run a command, healthy on exit code 0
    Exec(Vec<String>),
    /// GET a URL, healthy on a 2xx response
    Http(String),
    /// Open a TCP connection to `host:port`
    Tcp(String),
}

fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_restart_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_restart_backoff_max() -> Duration {
    Duration::from_secs(60)
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retries() -> u32 {
    3
}

fn default_start_period() -> Duration {
    Duration::ZERO
}

impl Topology {
    /// Read, parse and validate a topology file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate a topology document
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let topology: Topology = toml::from_str(raw)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Validate constraints the TOML schema cannot express
    ///
    /// # Validation Rules
    /// - at least one service, with unique non-empty names
    /// - `command` has a program
    /// - every `depends_on` entry names another known service
    /// - the dependency graph has no cycles
    /// - healthcheck `retries >= 1`, a non-zero `interval` and `timeout`
    /// - `restart_backoff <= restart_backoff_max`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::Topology("no services defined".to_string()));
        }

        if self.supervisor.restart_backoff > self.supervisor.restart_backoff_max {
            return Err(ConfigError::Topology(
                "supervisor.restart_backoff must not exceed restart_backoff_max".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::Topology("service name cannot be empty".to_string()));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::Topology(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }
            if service.command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(ConfigError::Topology(format!(
                    "services.{}.command must name a program",
                    service.name
                )));
            }
            if let Some(check) = &service.healthcheck {
                if check.retries == 0 {
                    return Err(ConfigError::Topology(format!(
                        "services.{}.healthcheck.retries must be >= 1",
                        service.name
                    )));
                }
                if check.interval.is_zero() {
                    return Err(ConfigError::Topology(format!(
                        "services.{}.healthcheck.interval must be > 0",
                        service.name
                    )));
                }
                if check.timeout.is_zero() {
                    return Err(ConfigError::Topology(format!(
                        "services.{}.healthcheck.timeout must be > 0",
                        service.name
                    )));
                }
                if let ProbeTarget::Exec(argv) = &check.test {
                    if argv.is_empty() {
                        return Err(ConfigError::Topology(format!(
                            "services.{}.healthcheck.test.exec cannot be empty",
                            service.name
                        )));
                    }
                }
            }
        }

        for service in &self.services {
            for dep in &service.depends_on {
                if dep == &service.name {
                    return Err(ConfigError::Topology(format!(
                        "service '{}' depends on itself",
                        service.name
                    )));
                }
                if !names.contains(dep.as_str()) {
                    return Err(ConfigError::Topology(format!(
                        "service '{}' depends on unknown service '{}'",
                        service.name, dep
                    )));
                }
            }
        }

        self.startup_order().map(|_| ())
    }

    /// Services sorted so every service comes after its dependencies
    ///
    /// Ties keep declaration order.
    pub fn startup_order(&self) -> Result<Vec<&ServiceDefinition>, ConfigError> {
        let index: HashMap<&str, usize> = self
            .services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut pending: Vec<usize> = self.services.iter().map(|s| s.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.services.len()];
        for (i, service) in self.services.iter().enumerate() {
            for dep in &service.depends_on {
                if let Some(&d) = index.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: VecDeque<usize> = (0..self.services.len())
            .filter(|&i| pending[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.services.len());

        while let Some(i) = ready.pop_front() {
            order.push(&self.services[i]);
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() != self.services.len() {
            let stuck: Vec<&str> = self
                .services
                .iter()
                .enumerate()
                .filter(|(i, _)| pending[*i] > 0)
                .map(|(_, s)| s.name.as_str())
                .collect();
            return Err(ConfigError::Topology(format!(
                "dependency cycle between services: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }
}
