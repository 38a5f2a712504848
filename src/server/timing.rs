//! Request timing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Log method, path, status and processing time of every request
pub async fn log_processing_time(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        processing_time_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Request processed"
    );
    response
}
