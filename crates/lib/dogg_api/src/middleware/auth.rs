//! Bearer token authentication for protected routes.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use dogg_core::auth::TokenError;
use dogg_core::models::auth::TokenClaims;
use tracing::warn;

use super::client::ClientAddr;
use crate::AppState;
use crate::error::AppError;

/// Characters of a rejected token that may appear in logs.
const LOGGED_TOKEN_PREFIX: usize = 12;

/// Verified token claims, stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub TokenClaims);

/// The token carried by `Authorization: Bearer <token>`.
///
/// Any other scheme, a non-ASCII header or an empty token counts as no token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Verify the request's bearer token against the configured signing key.
pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    client: &str,
    path: &str,
) -> Result<TokenClaims, AppError> {
    let Some(token) = bearer_token(headers) else {
        warn!(target: "security", client, path, "authentication attempt without token");
        return Err(AppError::from(TokenError::Missing));
    };
    let tokens = state.tokens()?;
    tokens.verify(Some(token)).map_err(|reason| {
        let prefix: String = token.chars().take(LOGGED_TOKEN_PREFIX).collect();
        warn!(
            target: "security",
            client, path, %reason, token = %format_args!("{prefix}..."),
            "invalid token used"
        );
        AppError::from(reason)
    })
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it,
/// and injects [`AuthUser`] into request extensions.
///
/// No token is 401; a malformed, tampered or expired token is 403; a missing
/// signing key is 500.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(
        &state,
        request.headers(),
        ClientAddr::of(request.extensions()),
        request.uri().path(),
    )?;
    request.extensions_mut().insert(AuthUser(claims));
    Ok(next.run(request).await)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>().cloned() {
            return Ok(user);
        }
        authenticate(
            state,
            &parts.headers,
            ClientAddr::of(&parts.extensions),
            parts.uri.path(),
        )
        .map(AuthUser)
    }
}
