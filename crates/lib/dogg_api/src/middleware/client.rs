//! Client identification for logging and rate limiting.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;

/// Key shared by requests whose peer cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolved client identifier, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    /// The identifier recorded for `extensions`, or [`UNKNOWN_CLIENT`].
    pub fn of(extensions: &Extensions) -> &str {
        extensions
            .get::<ClientAddr>()
            .map(|c| c.0.as_str())
            .unwrap_or(UNKNOWN_CLIENT)
    }
}

/// Work out the client identifier.
///
/// The first `X-Forwarded-For` hop is only used when the deployment says a
/// trusted proxy sets it; otherwise a client could mint a fresh rate-limit
/// window per request by rotating the header.
pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for
        && let Some(first) = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    {
        return first.to_owned();
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned())
}

/// Middleware: resolve the client once and record it as [`ClientAddr`].
pub async fn identify_client(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = resolve(
        request.headers(),
        request.extensions(),
        state.config.rate_limit.trust_forwarded_for,
    );
    request.extensions_mut().insert(ClientAddr(client));
    next.run(request).await
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr(ClientAddr::of(&parts.extensions).to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_peer(ip: &str) -> Extensions {
        let mut ext = Extensions::new();
        let addr: SocketAddr = format!("{ip}:4000").parse().unwrap();
        ext.insert(ConnectInfo(addr));
        ext
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn uses_peer_address() {
        assert_eq!(resolve(&HeaderMap::new(), &with_peer("10.1.2.3"), false), "10.1.2.3");
    }

    #[test]
    fn ignores_forwarded_for_unless_trusted() {
        let headers = forwarded("203.0.113.9, 10.0.0.1");
        assert_eq!(resolve(&headers, &with_peer("10.1.2.3"), false), "10.1.2.3");
        assert_eq!(resolve(&headers, &with_peer("10.1.2.3"), true), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(resolve(&HeaderMap::new(), &Extensions::new(), false), UNKNOWN_CLIENT);
        assert_eq!(resolve(&forwarded(" "), &Extensions::new(), true), UNKNOWN_CLIENT);
    }
}
