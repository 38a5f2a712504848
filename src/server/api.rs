//! HTTP surface of the API process
//!
//! - `GET /api/health/service_health` - dependency health report; `200` when
//!   the process is ready and every dependency is `OK`, `503` otherwise

use super::shutdown::ShutdownSignal;
use super::timing::log_processing_time;
use crate::health::{HealthReport, HealthService, HealthStatus};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub const HEALTH_PATH: &str = "/api/health/service_health";

/// Whether the process accepts dependent traffic
///
/// Set once pre-flight succeeded and the listener is bound; cleared when
/// shutdown begins so the supervisor stops routing to this process.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    /// Initially not ready
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ApiState {
    readiness: ReadinessState,
    health: HealthService,
}

async fn service_health(State(state): State<ApiState>) -> Response {
    if !state.readiness.is_ready() {
        // not serving yet (or draining): no database round trip
        let report = HealthReport {
            status: HealthStatus::Error,
            deps: Vec::new(),
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response();
    }

    let report = state.health.report().await;
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

pub fn api_router(readiness: ReadinessState, health: HealthService) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(service_health))
        .layer(middleware::from_fn(log_processing_time))
        .with_state(ApiState { readiness, health })
}

/// Serve the API on an already bound listener until `shutdown` fires
///
/// The caller binds first and marks `readiness` once pre-flight passed and
/// the bind succeeded; this clears it when shutdown begins.
pub async fn run_api_server(
    listener: TcpListener,
    readiness: ReadinessState,
    health: HealthService,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = api_router(readiness.clone(), health);
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.wait().await;
            readiness.set_not_ready();
        })
        .await
}
