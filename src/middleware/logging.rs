use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

/// Bodies here are small JSON envelopes or JWS strings; anything larger than
/// this is suspicious and gets cut off in the log.
const MAX_LOGGED_BODY: usize = 2000;
const MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Middleware that logs request and response bodies with a per-request id
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body = %truncate_body(&String::from_utf8_lossy(&bytes)),
        "→ Request"
    );

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    let latency = start.elapsed();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        body = %truncate_body(&String::from_utf8_lossy(&bytes)),
        "← Response"
    );

    Response::from_parts(parts, Body::from(bytes))
}

/// Truncate body for logging, adding ellipsis if truncated
fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_LOGGED_BODY {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX_LOGGED_BODY).collect();
        format!("{}...[truncated, {} bytes total]", head, body.len())
    }
}
