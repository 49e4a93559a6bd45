//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use dogg_core::validation::identity::{LoginInput, RegisterInput};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::Valid;
use crate::middleware::auth::AuthUser;
use crate::middleware::client::ClientAddr;
use crate::models::{AuthResponse, MeResponse, MessageResponse, RefreshResponse};
use crate::services::auth;

/// `POST /api/auth/register`: Create an account and return its first token.
pub async fn register_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Valid(body): Valid<RegisterInput>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let resp = auth::register(&state, body, &client).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `POST /api/auth/login`: Authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Valid(body): Valid<LoginInput>,
) -> AppResult<Json<AuthResponse>> {
    let resp = auth::login(&state, body, &client).await?;
    Ok(Json(resp))
}

/// `POST /api/auth/refresh`: Re-issue the presented token. Requires authentication.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<RefreshResponse>> {
    Ok(Json(auth::refresh(&state, &claims, &client)?))
}

/// `POST /api/auth/logout`: Acknowledge logout. Requires authentication.
pub async fn logout_handler(
    ClientAddr(client): ClientAddr,
    AuthUser(claims): AuthUser,
) -> Json<MessageResponse> {
    Json(auth::logout(&claims, &client))
}

/// `GET /api/auth/me`: Current user's profile. Requires authentication.
pub async fn me_handler(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<MeResponse>> {
    Ok(Json(auth::me(&state, &claims).await?))
}
