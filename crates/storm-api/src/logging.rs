//! Request logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

/// Log method, URI, status and duration of every request.
pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = elapsed_ms(started);
    let reason = status.canonical_reason().unwrap_or("");
    if status.is_server_error() {
        warn!(%method, %uri, status = status.as_u16(), elapsed_ms, "{reason}");
    } else {
        info!(%method, %uri, status = status.as_u16(), elapsed_ms, "{reason}");
    }
    response
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
