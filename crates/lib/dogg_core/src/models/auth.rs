//! Identity domain models.
//!
//! These are internal domain models, distinct from the HTTP response DTOs in
//! `dogg_api::models` (which rename fields to camelCase).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const REDACTED: &str = "<redacted>";

/// Persisted identity record. Holds the password hash, so it is never
/// serialized and its `Debug` output redacts the hash; use [`PublicUser`]
/// for anything that leaves the process.
#[derive(Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    /// Lower-cased email.
    pub email: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Public projection of the record (no password hash).
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            avatar_url: self.avatar_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Identity claims snapshot for token issuance.
    pub fn claims(&self) -> IdentityClaims {
        IdentityClaims {
            sub: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &REDACTED)
            .field("avatar_url", &self.avatar_url)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Input for creating an identity record.
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &REDACTED)
            .field("avatar_url", &self.avatar_url)
            .finish()
    }
}

/// Mutable profile fields.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub avatar_url: Option<Option<String>>,
}

/// Public profile fields of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity fields embedded in a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject: user id (standard JWT `sub` claim).
    pub sub: String,
    pub username: String,
    pub email: String,
}

/// Full JWT payload: identity claims plus issue and expiry timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: IdentityClaims,
    /// Unique token id, so two tokens issued in the same second differ.
    pub jti: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}
