//! # dogg_api
//!
//! HTTP API library for DOGG: the authentication routes and the security
//! envelope every request passes through.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use dogg_core::auth::{CredentialHasher, TokenService, UserStore};
use dogg_core::rate_limit::FixedWindowLimiter;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::error;

use crate::config::{ApiConfig, ConfigError, RateLimitSettings};
use crate::error::{AppError, AppResult};
use crate::handlers::{auth, health};
use crate::middleware::rate_limit::{AUTH_LIMIT_MESSAGE, GENERAL_LIMIT_MESSAGE, RateLimitGuard};

/// The general and authentication limiters.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub general: Arc<FixedWindowLimiter>,
    pub auth: Arc<FixedWindowLimiter>,
}

impl Limiters {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let build = |policy| {
            Arc::new(if settings.enabled {
                FixedWindowLimiter::new(policy)
            } else {
                FixedWindowLimiter::disabled(policy)
            })
        };
        Self {
            general: build(settings.general),
            auth: build(settings.auth),
        }
    }

    /// Start the periodic expired-window sweep for both limiters.
    pub fn spawn_sweep_tasks(&self, settings: &RateLimitSettings) -> Vec<JoinHandle<()>> {
        if !settings.enabled {
            return Vec::new();
        }
        vec![
            self.general.spawn_sweep_task(settings.sweep_interval),
            self.auth.spawn_sweep_task(settings.sweep_interval),
        ]
    }
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Identity store collaborator.
    pub store: Arc<dyn UserStore>,
    pub hasher: CredentialHasher,
    /// `None` when no signing key is configured.
    pub tokens: Option<Arc<TokenService>>,
    pub limiters: Limiters,
    /// API configuration.
    pub config: ApiConfig,
    cors_origin: HeaderValue,
}

impl AppState {
    /// Build the state from configuration.
    ///
    /// A missing signing key is not an error here: the server still starts
    /// and every token operation answers with a configuration error.
    pub fn new(config: ApiConfig, store: Arc<dyn UserStore>) -> Result<Self, ConfigError> {
        let hasher =
            CredentialHasher::new(config.bcrypt_cost).map_err(|e| ConfigError::Invalid {
                var: "BCRYPT_COST",
                value: config.bcrypt_cost.to_string(),
                reason: e.to_string(),
            })?;
        let cors_origin =
            HeaderValue::from_str(&config.web_app_url).map_err(|e| ConfigError::Invalid {
                var: "WEB_APP_URL",
                value: config.web_app_url.clone(),
                reason: e.to_string(),
            })?;
        let tokens = config
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(TokenService::new(secret.as_bytes(), config.token_ttl_secs)));
        if tokens.is_none() {
            error!(target: "security", "JWT_SECRET not configured; token operations will fail");
        }

        Ok(Self {
            store,
            hasher,
            tokens,
            limiters: Limiters::from_settings(&config.rate_limit),
            config,
            cors_origin,
        })
    }

    /// The token service, or a configuration error when no key is set.
    pub fn tokens(&self) -> AppResult<&TokenService> {
        self.tokens.as_deref().ok_or_else(|| {
            error!(target: "security", "JWT_SECRET not configured");
            AppError::Configuration("JWT_SECRET not configured".into())
        })
    }
}

/// Require a valid bearer token on every route of `router`.
///
/// Handlers behind it read the claims with the
/// [`AuthUser`](middleware::auth::AuthUser) extractor.
pub fn protect(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.route_layer(from_fn_with_state(state, middleware::auth::require_auth))
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    router_with_resources(state, Router::new())
}

/// Builds the router with additional resource routes mounted inside the
/// security envelope.
///
/// Stage order, outermost first: request id, security headers, client
/// identification, access log, terminal error handler, panic catcher,
/// general rate limit, CORS, body ceiling. The body ceiling is layered on the
/// router directly since it changes the request body type. Authentication
/// routes add the stricter limiter; protected routes add bearer verification.
pub fn router_with_resources(state: AppState, resources: Router<AppState>) -> Router {
    let auth_guard = RateLimitGuard::new(state.limiters.auth.clone(), AUTH_LIMIT_MESSAGE);
    let general_guard = RateLimitGuard::new(state.limiters.general.clone(), GENERAL_LIMIT_MESSAGE);

    // Public auth routes
    let credentials = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler));

    // Token-bearing auth routes
    let session = protect(
        Router::new()
            .route("/refresh", post(auth::refresh_handler))
            .route("/logout", post(auth::logout_handler))
            .route("/me", get(auth::me_handler)),
        state.clone(),
    );

    let auth_routes = credentials
        .merge(session)
        .route_layer(from_fn_with_state(auth_guard, middleware::rate_limit::enforce));

    let cors = CorsLayer::new()
        .allow_origin(state.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    let envelope = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(from_fn(middleware::security_headers::security_headers))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::client::identify_client,
        ))
        .layer(from_fn(middleware::request_log::log_requests))
        .layer(from_fn(middleware::error_handler::conceal_internal_errors))
        .layer(CatchPanicLayer::custom(middleware::error_handler::panic_response))
        .layer(from_fn_with_state(
            general_guard,
            middleware::rate_limit::enforce,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/security/status", get(health::security_status_handler))
        .nest("/api/auth", auth_routes)
        .merge(resources)
        .layer(RequestBodyLimitLayer::new(state.config.body_limit_bytes))
        .layer(envelope)
        .with_state(state)
}
