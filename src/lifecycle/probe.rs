//! Health probes
//!
//! A probe answers one question: is the target able to serve right now?
//! - `ExecProbe`: runs a command (e.g. `pg_isready`), healthy on exit code 0
//! - `HttpProbe`: GETs a URL, healthy on a 2xx response
//! - `TcpProbe`: healthy when a TCP connection can be opened
//! - `MockProbe`: scripted results for tests

use crate::config::ProbeTarget;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe target unreachable: {0}")]
    Unreachable(String),

    #[error("Probe failed: {0}")]
    Failed(String),
}

/// Timing and threshold parameters shared by the readiness gate and the
/// liveness monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Delay between two probes
    pub interval: Duration,
    /// Upper bound on a single probe
    pub timeout: Duration,
    /// Consecutive counted failures tolerated
    pub retries: u32,
    /// Grace window after start during which failures are not counted
    pub start_period: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            retries: 3,
            start_period: Duration::ZERO,
        }
    }
}

/// Trait for health probes
///
/// Production code builds probes from the topology with [`probe_for`].
/// Tests use `MockProbe`.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Run the probe once
    async fn check(&self) -> Result<(), ProbeError>;

    /// Short human-readable target, for logs
    fn describe(&self) -> String;
}

/// Run a probe, bounded by `timeout`
pub async fn run_probe(probe: &dyn Probe, timeout: Duration) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, probe.check()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Build the production probe for a topology target
pub fn probe_for(target: &ProbeTarget, timeout: Duration) -> Arc<dyn Probe> {
    match target {
        ProbeTarget::Exec(argv) => Arc::new(ExecProbe::new(argv.clone())),
        ProbeTarget::Http(url) => Arc::new(HttpProbe::new(url.clone(), timeout)),
        ProbeTarget::Tcp(addr) => Arc::new(TcpProbe::new(addr.clone())),
    }
}

/// Command probe, healthy on exit code 0
pub struct ExecProbe {
    argv: Vec<String>,
}

impl ExecProbe {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Probe for ExecProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ProbeError::Failed("empty probe command".to_string()));
        };

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Unreachable(format!("cannot run '{}': {}", program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ProbeError::Failed(format!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            stderr.trim().chars().take(200).collect::<String>()
        )))
    }

    fn describe(&self) -> String {
        format!("exec {}", self.argv.join(" "))
    }
}

/// HTTP GET probe, healthy on a 2xx response
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build probe HTTP client, using default");
                reqwest::Client::new()
            }
        };
        Self { client, url }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Failed(format!("request to {} timed out", self.url))
            } else {
                ProbeError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Failed(format!("HTTP {}", status)))
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.url)
    }
}

/// TCP connect probe
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: String) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        tokio::net::TcpStream::connect(&self.addr)
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Unreachable(format!("{}: {}", self.addr, e)))
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.addr)
    }
}

/// Shared, ordered record of what mocks observed
#[cfg(test)]
pub type EventLog = Arc<std::sync::Mutex<Vec<String>>>;

#[cfg(test)]
pub fn event_log() -> EventLog {
    Arc::new(std::sync::Mutex::new(Vec::new()))
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
enum MockOutcome {
    Healthy,
    Failing,
    HealthyFrom(tokio::time::Instant),
}

/// Mock probe for testing
///
/// Logs `probe:<name>:ok` or `probe:<name>:fail` to the event log on every call.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockProbe {
    name: String,
    outcome: std::sync::Mutex<MockOutcome>,
    calls: std::sync::atomic::AtomicU32,
    log: EventLog,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockProbe {
    fn with_outcome(name: &str, outcome: MockOutcome, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            outcome: std::sync::Mutex::new(outcome),
            calls: std::sync::atomic::AtomicU32::new(0),
            log,
        }
    }

    pub fn healthy(name: &str, log: EventLog) -> Self {
        Self::with_outcome(name, MockOutcome::Healthy, log)
    }

    pub fn failing(name: &str, log: EventLog) -> Self {
        Self::with_outcome(name, MockOutcome::Failing, log)
    }

    /// Fails until `from`, then passes (tokio time, so paused clocks apply)
    pub fn healthy_from(name: &str, from: tokio::time::Instant, log: EventLog) -> Self {
        Self::with_outcome(name, MockOutcome::HealthyFrom(from), log)
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.outcome.lock().expect("MockProbe lock poisoned") = if healthy {
            MockOutcome::Healthy
        } else {
            MockOutcome::Failing
        };
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[async_trait]
impl Probe for MockProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let outcome = *self.outcome.lock().expect("MockProbe lock poisoned");
        let healthy = match outcome {
            MockOutcome::Healthy => true,
            MockOutcome::Failing => false,
            MockOutcome::HealthyFrom(from) => tokio::time::Instant::now() >= from,
        };
        let verdict = if healthy { "ok" } else { "fail" };
        self.log
            .lock()
            .expect("event log poisoned")
            .push(format!("probe:{}:{}", self.name, verdict));

        if healthy {
            Ok(())
        } else {
            Err(ProbeError::Failed(format!("{} is down", self.name)))
        }
    }

    fn describe(&self) -> String {
        format!("mock {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Probe that never answers
    struct HangingProbe;

    #[async_trait]
    impl Probe for HangingProbe {
        async fn check(&self) -> Result<(), ProbeError> {
            std::future::pending().await
        }

        fn describe(&self) -> String {
            "hang".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_probe_times_out() {
        let result = run_probe(&HangingProbe, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ProbeError::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_exec_probe_success_and_failure() {
        let ok = ExecProbe::new(vec!["true".to_string()]);
        assert!(ok.check().await.is_ok());

        let fail = ExecProbe::new(vec!["false".to_string()]);
        assert!(matches!(fail.check().await, Err(ProbeError::Failed(_))));
    }

    #[tokio::test]
    async fn test_exec_probe_missing_program() {
        let probe = ExecProbe::new(vec!["/nonexistent/warden-probe".to_string()]);
        assert!(matches!(probe.check().await, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let probe = TcpProbe::new(addr.to_string());
        assert!(probe.check().await.is_ok());

        drop(listener);
        let closed = TcpProbe::new(addr.to_string());
        assert!(matches!(closed.check().await, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_http_probe_unreachable() {
        let probe = HttpProbe::new(
            "http://127.0.0.1:1/api/health/service_health".to_string(),
            Duration::from_secs(1),
        );
        assert!(probe.check().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_probe_healthy_from() {
        let log = event_log();
        let start = tokio::time::Instant::now();
        let probe = MockProbe::healthy_from("db", start + Duration::from_secs(10), log.clone());

        assert!(probe.check().await.is_err());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(probe.check().await.is_ok());

        assert_eq!(probe.calls(), 2);
        assert_eq!(
            *log.lock().expect("log"),
            vec!["probe:db:fail".to_string(), "probe:db:ok".to_string()]
        );
    }
}
