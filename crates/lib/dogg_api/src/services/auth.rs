//! Authentication flows: register, login, refresh, logout and whoami.
//!
//! Handlers stay thin; everything here is expressed against [`AppState`]
//! so the flows can be exercised without an HTTP stack.

use dogg_core::models::auth::{NewUser, TokenClaims};
use dogg_core::validation::{FieldError, FieldErrors};
use dogg_core::validation::identity::{EMAIL_TAKEN, LoginInput, RegisterInput, USERNAME_TAKEN};
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, MeResponse, MessageResponse, RefreshResponse};

/// Create an identity and issue its first token.
///
/// Username and email collisions are reported as field errors. The store
/// enforces both again on insert, so a concurrent duplicate that slips past
/// the pre-check still fails the same way.
pub async fn register(
    state: &AppState,
    input: RegisterInput,
    client: &str,
) -> AppResult<AuthResponse> {
    let tokens = state.tokens()?;

    let mut taken = FieldErrors::new();
    if state.store.find_by_username(&input.username).await?.is_some() {
        taken.push(FieldError::new("username", USERNAME_TAKEN));
    }
    if state.store.find_by_email(&input.email).await?.is_some() {
        taken.push(FieldError::new("email", EMAIL_TAKEN));
    }
    if !taken.is_empty() {
        warn!(target: "security", client, "registration rejected: identity already exists");
        return Err(AppError::Validation(taken));
    }

    let password_hash = state.hasher.hash_async(input.password).await?;
    let record = state
        .store
        .insert(NewUser {
            username: input.username,
            email: input.email,
            password_hash,
            avatar_url: None,
        })
        .await?;

    info!(
        target: "security",
        user_id = %record.id, username = %record.username, client,
        "user registered"
    );

    let token = tokens.issue(&record.claims())?;
    Ok(AuthResponse {
        message: "User registered successfully",
        token,
        user: record.public().into(),
    })
}

/// Exchange email and password for a token.
///
/// An unknown email and a wrong password produce the same error, and both
/// pay for one full hash verification.
pub async fn login(state: &AppState, input: LoginInput, client: &str) -> AppResult<AuthResponse> {
    let tokens = state.tokens()?;

    let user = state.store.find_by_email(&input.email).await?;
    let digest = user.as_ref().map(|u| u.password_hash.clone());
    let verified = state.hasher.verify_async(input.password, digest).await?;

    match user {
        Some(user) if verified => {
            info!(
                target: "security",
                user_id = %user.id, username = %user.username, client,
                "user logged in"
            );
            let token = tokens.issue(&user.claims())?;
            Ok(AuthResponse {
                message: "Login successful",
                token,
                user: user.public().into(),
            })
        }
        Some(user) => {
            warn!(
                target: "security",
                user_id = %user.id, client,
                "login attempt with invalid password"
            );
            Err(AppError::InvalidCredentials)
        }
        None => {
            warn!(target: "security", client, "login attempt with unknown email");
            Err(AppError::InvalidCredentials)
        }
    }
}

/// Re-issue a token with a fresh expiry from already verified claims.
pub fn refresh(state: &AppState, claims: &TokenClaims, client: &str) -> AppResult<RefreshResponse> {
    let token = state.tokens()?.refresh(claims)?;
    info!(target: "security", user_id = %claims.identity.sub, client, "token refreshed");
    Ok(RefreshResponse {
        message: "Token refreshed successfully",
        token,
    })
}

/// Acknowledge a logout. Tokens are not revoked server-side; the client
/// discards its copy and it stays valid until expiry.
pub fn logout(claims: &TokenClaims, client: &str) -> MessageResponse {
    info!(target: "security", user_id = %claims.identity.sub, client, "user logged out");
    MessageResponse {
        message: "Logged out successfully",
    }
}

/// Current profile, read live from the store.
pub async fn me(state: &AppState, claims: &TokenClaims) -> AppResult<MeResponse> {
    let user = state
        .store
        .find_by_id(&claims.identity.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(MeResponse {
        user: user.public().into(),
    })
}
