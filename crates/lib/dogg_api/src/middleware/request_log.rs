//! Per-request access log.

use axum::extract::Request;
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::client::ClientAddr;

/// Middleware: log method, path, client, user agent, status and duration.
///
/// Responses with status >= 400 are logged at warn level. Bodies are never
/// read here.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let client = ClientAddr::of(request.extensions()).to_owned();
    let user_agent = user_agent(&request);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = started.elapsed().as_millis() as u64;
    let timestamp = Utc::now().to_rfc3339();
    if status >= 400 {
        warn!(
            target: "http",
            %method, %path, %client, %user_agent, status, duration_ms, %timestamp,
            "HTTP error response"
        );
    } else {
        info!(
            target: "http",
            %method, %path, %client, %user_agent, status, duration_ms, %timestamp,
            "HTTP request"
        );
    }
    response
}

pub(crate) fn user_agent(request: &Request) -> String {
    request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_owned()
}
