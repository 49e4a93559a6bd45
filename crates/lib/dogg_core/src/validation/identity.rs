//! Identity field rules for registration and login bodies.

use std::sync::LazyLock;

use serde::Deserialize;

use super::schema::{CharClass, Field, Schema};

pub const USERNAME_MESSAGE: &str =
    "Username must be 3-20 characters and contain only letters, numbers, and underscores";
pub const EMAIL_MESSAGE: &str = "Must be a valid email address";
pub const PASSWORD_MESSAGE: &str =
    "Password must be 8+ characters with uppercase, lowercase, number, and special character";
pub const USERNAME_TAKEN: &str = "Username already exists";
pub const EMAIL_TAKEN: &str = "Email already registered";

static REGISTER: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .field(
            Field::string("username")
                .trimmed()
                .length(3, 20)
                .charset(CharClass::Word)
                .message(USERNAME_MESSAGE),
        )
        .field(Field::email("email").message(EMAIL_MESSAGE))
        .field(
            Field::string("password")
                .length(8, 128)
                .complexity()
                .message(PASSWORD_MESSAGE),
        )
});

static LOGIN: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .field(Field::email("email").message("Valid email required"))
        .field(Field::string("password").non_empty().message("Password required"))
});

/// Schema for `POST /auth/register`.
pub fn register_schema() -> &'static Schema {
    &REGISTER
}

/// Schema for `POST /auth/login`.
pub fn login_schema() -> &'static Schema {
    &LOGIN
}

/// Sanitized registration body.
#[derive(Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Sanitized login body.
#[derive(Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterInput")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}
