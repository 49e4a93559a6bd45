//! Declarative request-body validation.
//!
//! A [`Schema`] lists the fields a body may carry and the rules each must
//! satisfy. Validation is all-or-nothing: either every declared field passes
//! and the sanitized object (undeclared fields dropped) is returned, or every
//! failing field is reported at once.

pub mod identity;
pub mod schema;

pub use schema::{CharClass, Field, FieldError, FieldErrors, Kind, Sanitized, Schema};
