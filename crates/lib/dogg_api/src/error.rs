//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dogg_core::auth::{AuthError, StoreError, TokenError};
use dogg_core::validation::FieldErrors;
use serde::Serialize;
use thiserror::Error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

pub const VALIDATION_FAILED: &str = "Validation failed";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const TOKEN_REQUIRED: &str = "Access token required";
pub const TOKEN_INVALID: &str = "Invalid or expired token";
pub const CONFIGURATION_ERROR: &str = "Server configuration error";
pub const INTERNAL_ERROR: &str = "An internal error occurred";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access token required")]
    TokenMissing,

    /// Malformed, tampered and expired tokens all land here.
    #[error("Invalid or expired token ({0})")]
    TokenInvalid(TokenError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(&'static str),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Server-side detail of a 5xx response.
///
/// Attached as a response extension so the terminal error handler can log it
/// and strip it before anything reaches the client.
#[derive(Debug, Clone)]
pub struct FailureDetail {
    pub detail: String,
    /// Whether the body must be replaced by the generic envelope.
    pub conceal: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a FieldErrors>,
}

impl ErrorBody<'_> {
    fn plain(error: &str) -> ErrorBody<'_> {
        ErrorBody {
            error,
            details: None,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::TokenMissing => StatusCode::UNAUTHORIZED,
            AppError::TokenInvalid(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, failure) = match &self {
            AppError::Validation(details) => (
                ErrorBody {
                    error: VALIDATION_FAILED,
                    details: Some(details),
                },
                None,
            ),
            AppError::InvalidCredentials => (ErrorBody::plain(INVALID_CREDENTIALS), None),
            AppError::TokenMissing => (ErrorBody::plain(TOKEN_REQUIRED), None),
            AppError::TokenInvalid(_) => (ErrorBody::plain(TOKEN_INVALID), None),
            AppError::NotFound(m) => (ErrorBody::plain(m), None),
            AppError::RateLimited(m) => (ErrorBody::plain(m), None),
            AppError::Configuration(d) => (
                ErrorBody::plain(CONFIGURATION_ERROR),
                Some(FailureDetail {
                    detail: d.clone(),
                    conceal: false,
                }),
            ),
            AppError::Internal(d) => (
                ErrorBody::plain(INTERNAL_ERROR),
                Some(FailureDetail {
                    detail: d.clone(),
                    conceal: true,
                }),
            ),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(failure) = failure {
            response.extensions_mut().insert(failure);
        }
        response
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Missing => AppError::TokenMissing,
            other => AppError::TokenInvalid(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::Token(t) => AppError::from(t),
            AuthError::Validation(details) => AppError::Validation(details),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::from(AuthError::from(e))
    }
}
