//! Rate limiting stage.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dogg_core::rate_limit::{FixedWindowLimiter, RateDecision};
use tracing::warn;

use super::client::ClientAddr;
use super::request_log::user_agent;
use crate::error::AppError;

pub const GENERAL_LIMIT_MESSAGE: &str = "Too many requests, please slow down";
pub const AUTH_LIMIT_MESSAGE: &str =
    "Too many authentication attempts, please try again in 15 minutes";

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// A limiter plus the message its rejections carry.
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    limiter: Arc<FixedWindowLimiter>,
    message: &'static str,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<FixedWindowLimiter>, message: &'static str) -> Self {
        Self { limiter, message }
    }
}

/// Middleware: count the request against the client's window.
///
/// A disabled limiter passes requests through untouched. When guards are
/// nested the innermost one's headers win.
pub async fn enforce(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    if !guard.limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = ClientAddr::of(request.extensions()).to_owned();
    let decision = guard.limiter.check(&client);

    if !decision.allowed {
        warn!(
            target: "security",
            %client,
            path = %request.uri().path(),
            method = %request.method(),
            user_agent = %user_agent(&request),
            limit = decision.limit,
            "rate limit exceeded"
        );
        let mut response = AppError::RateLimited(guard.message).into_response();
        let headers = response.headers_mut();
        stamp(headers, &decision);
        headers.insert(RETRY_AFTER, HeaderValue::from(decision.reset_secs()));
        return response;
    }

    let mut response = next.run(request).await;
    stamp(response.headers_mut(), &decision);
    response
}

fn stamp(headers: &mut HeaderMap, decision: &RateDecision) {
    let values = [
        (RATELIMIT_LIMIT, u64::from(decision.limit)),
        (RATELIMIT_REMAINING, u64::from(decision.remaining)),
        (RATELIMIT_RESET, decision.reset_secs()),
    ];
    for (name, value) in values {
        headers.entry(name).or_insert_with(|| HeaderValue::from(value));
    }
}
