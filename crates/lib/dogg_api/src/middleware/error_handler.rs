//! Terminal error handling.
//!
//! The only stage allowed to emit the generic 500 envelope. Anything that
//! reaches it as a server error is logged in full and answered with a fixed
//! message plus the request correlation id.

use std::any::Any;

use axum::Json;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use super::client::ClientAddr;
use super::request_log::user_agent;
use crate::error::{AppError, FailureDetail, INTERNAL_ERROR};

const X_REQUEST_ID: &str = "x-request-id";

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_owned()
}

/// Middleware: log and conceal server errors.
pub async fn conceal_internal_errors(request: Request, next: Next) -> Response {
    let request_id = request_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let client = ClientAddr::of(request.extensions()).to_owned();
    let user_agent = user_agent(&request);

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_server_error() {
        return response;
    }

    match response.extensions_mut().remove::<FailureDetail>() {
        Some(FailureDetail {
            detail,
            conceal: false,
        }) => {
            error!(
                target: "security",
                %detail, %method, %path, %client, %request_id,
                "server configuration error"
            );
            response
        }
        failure => {
            let detail = failure
                .map(|f| f.detail)
                .unwrap_or_else(|| "unhandled server error response".to_owned());
            error!(
                target: "security",
                %detail, status = status.as_u16(), %method, %path, %client, %user_agent, %request_id,
                "unhandled error"
            );
            (
                status,
                Json(json!({ "error": INTERNAL_ERROR, "requestId": request_id })),
            )
                .into_response()
        }
    }
}

/// Panic handler for `CatchPanicLayer`: turns the panic into an internal
/// error for [`conceal_internal_errors`] to log.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else {
        "unknown panic payload".to_owned()
    };
    AppError::Internal(format!("handler panicked: {message}")).into_response()
}
