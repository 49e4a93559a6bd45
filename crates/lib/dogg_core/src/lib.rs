//! # dogg_core
//!
//! Security primitives for the DOGG API: credential hashing, bearer tokens,
//! request-body schemas, fixed-window rate limiting and the identity store
//! contract consumed by the HTTP layer.

pub mod auth;
pub mod models;
pub mod rate_limit;
pub mod validation;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
