//! Request extractors.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use dogg_core::validation::identity::{LoginInput, RegisterInput, login_schema, register_schema};
use dogg_core::validation::schema::BODY_PATH;
use dogg_core::validation::{FieldError, FieldErrors, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::AppError;

/// A request body type bound to a declarative schema.
pub trait Validated: DeserializeOwned {
    fn schema() -> &'static Schema;
}

impl Validated for RegisterInput {
    fn schema() -> &'static Schema {
        register_schema()
    }
}

impl Validated for LoginInput {
    fn schema() -> &'static Schema {
        login_schema()
    }
}

/// JSON body that passed its schema. Undeclared fields are dropped before
/// deserialization.
///
/// Malformed JSON and non-object bodies are validation failures (400).
/// Bodies over the configured ceiling are rejected with 413 before parsing.
#[derive(Debug, Clone)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: Validated,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_owned();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|_| {
                reject(&path, FieldError::new(BODY_PATH, "Malformed JSON body").into())
            })?
        };

        T::schema()
            .validate_into(&body)
            .map(Valid)
            .map_err(|errors| reject(&path, errors))
    }
}

fn reject(path: &str, errors: FieldErrors) -> Response {
    let fields: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    warn!(target: "security", path, ?fields, "validation failed");
    AppError::Validation(errors).into_response()
}
