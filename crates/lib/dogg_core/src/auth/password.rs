//! Password hashing via bcrypt.
//!
//! bcrypt embeds a fresh random salt in every digest and compares digests in
//! constant time, so callers never compare hashes themselves.
//!
//! bcrypt only reads the first 72 bytes of its input. Secrets are reduced to
//! a SHA-256 hex string (64 bytes) first, so every byte of a long password
//! counts.

use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};

use super::AuthError;

/// bcrypt cost factor used in production (~250ms per hash on commodity CPUs).
pub const DEFAULT_COST: u32 = 12;

/// Lowest cost bcrypt accepts. Only suitable for tests.
pub const MIN_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_COST: u32 = 31;

/// One-way password hasher with a fixed work factor.
///
/// Holds a decoy digest computed at construction so that a login against an
/// unknown account still pays for one full verification.
#[derive(Clone)]
pub struct CredentialHasher {
    cost: u32,
    decoy: Arc<str>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl CredentialHasher {
    /// Build a hasher with the given bcrypt cost.
    pub fn new(cost: u32) -> Result<Self, AuthError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(AuthError::Internal(format!(
                "bcrypt cost {cost} outside {MIN_COST}..={MAX_COST}"
            )));
        }
        let filler: String = rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let decoy = bcrypt::non_truncating_hash(prehash(&filler), cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt decoy hash: {e}")))?;
        Ok(Self {
            cost,
            decoy: decoy.into(),
        })
    }

    /// Configured work factor.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret. Every call yields a different digest.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::non_truncating_hash(prehash(secret), self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Verify a secret against a digest. Malformed digests verify as `false`.
    pub fn verify(&self, secret: &str, digest: &str) -> bool {
        bcrypt::non_truncating_verify(prehash(secret), digest).unwrap_or(false)
    }

    /// Run a verification against the decoy digest and report failure.
    pub fn verify_decoy(&self, secret: &str) -> bool {
        let _ = bcrypt::non_truncating_verify(prehash(secret), &self.decoy);
        false
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_async(&self, secret: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| AuthError::Internal(format!("hash task: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking pool. `None` digest runs the
    /// decoy verification.
    pub async fn verify_async(
        &self,
        secret: String,
        digest: Option<String>,
    ) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match digest {
            Some(d) => hasher.verify(&secret, &d),
            None => hasher.verify_decoy(&secret),
        })
        .await
        .map_err(|e| AuthError::Internal(format!("verify task: {e}")))
    }
}

/// Fixed-length bcrypt input for a secret of any length.
fn prehash(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}
