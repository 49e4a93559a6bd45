//! Authentication primitives.
//!
//! Password hashing, bearer token issuance and verification, and the
//! identity store contract shared by the HTTP layer.

pub mod jwt;
pub mod password;
pub mod store;

use thiserror::Error;

use crate::validation::FieldErrors;

pub use jwt::{TokenError, TokenService};
pub use password::CredentialHasher;
pub use store::{InMemoryUserStore, StoreError, UserStore};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately carries no detail.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => AuthError::Validation(field.into()),
            StoreError::Unavailable(msg) => AuthError::Internal(msg),
        }
    }
}
