//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use dogg_api::AppState;
use dogg_api::config::{ApiConfig, RateLimitSettings};
use dogg_core::auth::InMemoryUserStore;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret-key-0123456789";
pub const PASSWORD: &str = "SecurePass123!";

/// Fast hashing, limiter off, signing key set.
pub fn config() -> ApiConfig {
    ApiConfig {
        jwt_secret: Some(SECRET.into()),
        bcrypt_cost: 4,
        rate_limit: RateLimitSettings::disabled(),
        ..ApiConfig::default()
    }
}

pub fn state(config: ApiConfig) -> AppState {
    AppState::new(config, Arc::new(InMemoryUserStore::new())).expect("valid test config")
}

pub fn app(config: ApiConfig) -> (Router, AppState) {
    let state = state(config);
    (dogg_api::router(state.clone()), state)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Attach a peer address the way the server's connect-info service would.
pub fn from_peer(mut req: Request<Body>, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:50000").parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub fn registration(username: &str, email: &str) -> Value {
    json!({ "username": username, "email": email, "password": PASSWORD })
}

/// Register and return the issued token.
pub async fn register(app: &Router, username: &str, email: &str) -> String {
    let resp = send(
        app,
        json_request(Method::POST, "/api/auth/register", &registration(username, email)),
    )
    .await;
    assert_eq!(resp.status, StatusCode::CREATED, "register failed: {}", resp.body);
    resp.body["token"].as_str().expect("token").to_owned()
}
