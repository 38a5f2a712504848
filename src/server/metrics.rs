//! Prometheus metrics for the supervisor
//!
//! - `warden_service_restarts_total{service}` - automatic and manual restarts
//! - `warden_probe_failures_total{service}` - failed liveness probes
//! - `warden_service_up{service}` - 1 while the process is running

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub type SharedMetrics = Arc<SupervisorMetrics>;

pub struct SupervisorMetrics {
    registry: Registry,
    restarts: IntCounterVec,
    probe_failures: IntCounterVec,
    up: IntGaugeVec,
}

impl SupervisorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let restarts = IntCounterVec::new(
            Opts::new(
                "warden_service_restarts_total",
                "Number of times a service was restarted",
            ),
            &["service"],
        )?;
        let probe_failures = IntCounterVec::new(
            Opts::new(
                "warden_probe_failures_total",
                "Number of failed liveness probes",
            ),
            &["service"],
        )?;
        let up = IntGaugeVec::new(
            Opts::new("warden_service_up", "Whether the service process is running"),
            &["service"],
        )?;

        registry.register(Box::new(restarts.clone()))?;
        registry.register(Box::new(probe_failures.clone()))?;
        registry.register(Box::new(up.clone()))?;

        Ok(Self {
            registry,
            restarts,
            probe_failures,
            up,
        })
    }

    pub fn record_restart(&self, service: &str) {
        self.restarts.with_label_values(&[service]).inc();
    }

    pub fn record_probe_failure(&self, service: &str) {
        self.probe_failures.with_label_values(&[service]).inc();
    }

    pub fn set_up(&self, service: &str, up: bool) {
        self.up.with_label_values(&[service]).set(i64::from(up));
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Create the shared metrics registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    SupervisorMetrics::new().map(Arc::new)
}
