//! Per-request context and access logging.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::context::RequestContext;

/// Runs the rest of the stack inside a fresh [`RequestContext`].
///
/// Logs `BEGIN` on entry and `END` (2xx/3xx) or `ERROR` (everything else)
/// with the elapsed milliseconds.
pub async fn request_scope(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    RequestContext::run(move || async move {
        let started = Instant::now();
        tracing::debug!(%method, %path, "BEGIN");

        let response = next.run(request).await;
        let ms = started.elapsed().as_millis() as u64;
        let status = response.status().as_u16();
        if response.status().is_client_error() || response.status().is_server_error() {
            tracing::warn!(%method, %path, status, ms, "ERROR");
        } else {
            tracing::debug!(%method, %path, status, ms, "END");
        }
        response
    })
    .await
}
