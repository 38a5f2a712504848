//! HTTP servers and shutdown plumbing
//!
//! - `api` - the API process health endpoint
//! - `control` - the supervisor control surface and metrics
//!
//! Both servers stop gracefully when the shared `ShutdownSignal` fires.

pub mod api;
pub mod control;
pub mod metrics;
pub mod shutdown;
mod timing;

pub use api::{api_router, run_api_server, ReadinessState, HEALTH_PATH};
pub use control::{control_router, run_control_server};
pub use metrics::{create_metrics, SharedMetrics, SupervisorMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "api_test.rs"]
mod api_tests;

#[cfg(test)]
#[path = "control_test.rs"]
mod control_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
