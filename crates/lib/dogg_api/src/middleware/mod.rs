//! Request pipeline stages.
//!
//! Each stage either passes the request on or answers it with a terminal
//! response. The order they run in is fixed by [`crate::router_with_resources`].

pub mod auth;
pub mod client;
pub mod error_handler;
pub mod rate_limit;
pub mod request_log;
pub mod security_headers;
