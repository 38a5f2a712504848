//! Supervisor control surface
//!
//! - `GET /healthz` - the supervisor itself is alive
//! - `GET /services` - status of every service
//! - `GET /services/{name}` - status of one service
//! - `POST /services/{name}/stop` - manual stop, suppresses restarts
//! - `POST /services/{name}/start` - explicit start out of a stopped state
//! - `GET /metrics` - Prometheus metrics in text format

use super::metrics::SharedMetrics;
use super::shutdown::ShutdownSignal;
use super::timing::log_processing_time;
use crate::lifecycle::{ControlCommand, Controls, StatusBoard, SupervisorError};
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
struct ControlState {
    board: StatusBoard,
    controls: Controls,
    metrics: SharedMetrics,
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn list_services(State(state): State<ControlState>) -> impl IntoResponse {
    Json(state.board.all())
}

async fn get_service(State(state): State<ControlState>, Path(name): Path<String>) -> Response {
    match state.board.get(&name) {
        Some(status) => Json(status).into_response(),
        None => not_found(&name),
    }
}

async fn stop_service(state: State<ControlState>, name: Path<String>) -> Response {
    send_command(state, name, ControlCommand::Stop).await
}

async fn start_service(state: State<ControlState>, name: Path<String>) -> Response {
    send_command(state, name, ControlCommand::Start).await
}

async fn send_command(
    State(state): State<ControlState>,
    Path(name): Path<String>,
    command: ControlCommand,
) -> Response {
    match state.controls.send(&name, command).await {
        Ok(()) => {
            info!(service = %name, command = ?command, "Control command accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "service": name, "accepted": command })),
            )
                .into_response()
        }
        Err(SupervisorError::UnknownService(_)) => not_found(&name),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Unknown service: {}", name) })),
    )
        .into_response()
}

async fn metrics(State(state): State<ControlState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

pub fn control_router(board: StatusBoard, controls: Controls, metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/services", get(list_services))
        .route("/services/{name}", get(get_service))
        .route("/services/{name}/stop", post(stop_service))
        .route("/services/{name}/start", post(start_service))
        .route("/metrics", get(self::metrics))
        .layer(middleware::from_fn(log_processing_time))
        .with_state(ControlState {
            board,
            controls,
            metrics,
        })
}

/// Serve the control surface until `shutdown` fires
pub async fn run_control_server(
    port: u16,
    board: StatusBoard,
    controls: Controls,
    metrics: SharedMetrics,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = control_router(board, controls, metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Supervisor control server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
