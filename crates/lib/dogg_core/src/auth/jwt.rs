//! Bearer token issuance and verification (HS256 JWT).
//!
//! Tokens are self-contained: the server keeps no session table and no
//! revocation list, so expiry is the only way a token stops working.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use super::AuthError;
use crate::models::auth::{IdentityClaims, TokenClaims};

/// Token lifetime for login, registration and refresh: 24 hours.
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("no bearer token presented")]
    Missing,

    #[error("token is structurally invalid")]
    Malformed,

    #[error("token signature does not match")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,
}

/// Signs and verifies bearer tokens with a process-wide HMAC key.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build a token service from a signing secret and default lifetime.
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Default token lifetime in seconds.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token for `identity` with the default lifetime.
    pub fn issue(&self, identity: &IdentityClaims) -> Result<String, AuthError> {
        self.issue_with_ttl(identity, self.ttl)
    }

    /// Issue a token for `identity` expiring `ttl` from now.
    pub fn issue_with_ttl(
        &self,
        identity: &IdentityClaims,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = TokenClaims {
            identity: identity.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify a presented token. `None` or an empty string is [`TokenError::Missing`].
    pub fn verify(&self, token: Option<&str>) -> Result<TokenClaims, TokenError> {
        let token = match token.map(str::trim) {
            None | Some("") => return Err(TokenError::Missing),
            Some(t) => t,
        };
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = classify(e.kind());
                debug!(reason = %err, "token rejected");
                err
            })
    }

    /// Re-issue a token from claims returned by [`verify`](Self::verify):
    /// same identity, fresh `jti`, default lifetime from now.
    pub fn refresh(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        self.issue(&claims.identity)
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
        _ => TokenError::Malformed,
    }
}
