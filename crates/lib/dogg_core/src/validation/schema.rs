//! Schema and field rule definitions.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::ValidateEmail;

/// Sanitized body: only declared fields, normalized.
pub type Sanitized = Map<String, Value>;

/// Path reported when the body as a whole is unusable.
pub const BODY_PATH: &str = "body";

/// Special characters accepted by the password complexity rule.
pub const PASSWORD_SYMBOLS: &str = "@$!%*?&";

/// One offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Every offending field of a rejected body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error is reported for `path`.
    pub fn has(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path == path)
    }

    /// Merge another error list into this one.
    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }
}

impl From<FieldError> for FieldErrors {
    fn from(e: FieldError) -> Self {
        Self(vec![e])
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", e.path, e.message)?;
        }
        Ok(())
    }
}

/// JSON type a field must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    /// String holding a syntactically valid email; lower-cased on output.
    Email,
    Boolean,
    Integer,
}

/// Character classes for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// ASCII letters, digits and underscore.
    Word,
    /// ASCII letters and digits.
    Alphanumeric,
}

impl CharClass {
    fn admits(self, c: char) -> bool {
        match self {
            CharClass::Word => c.is_ascii_alphanumeric() || c == '_',
            CharClass::Alphanumeric => c.is_ascii_alphanumeric(),
        }
    }
}

/// One declared field and its rules.
#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
    trim: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    charset: Option<CharClass>,
    complexity: bool,
    message: Option<&'static str>,
}

impl Field {
    fn of(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            required: true,
            trim: false,
            min_len: None,
            max_len: None,
            charset: None,
            complexity: false,
            message: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::of(name, Kind::String)
    }

    pub fn email(name: &'static str) -> Self {
        Self::of(name, Kind::Email).trimmed()
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::of(name, Kind::Boolean)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::of(name, Kind::Integer)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Strip surrounding whitespace before checking and in the output.
    pub fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    /// Inclusive character-count bounds.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.min_len = Some(self.min_len.unwrap_or(0).max(1));
        self
    }

    pub fn charset(mut self, class: CharClass) -> Self {
        self.charset = Some(class);
        self
    }

    /// Require a lowercase letter, an uppercase letter, a digit and one of
    /// [`PASSWORD_SYMBOLS`].
    pub fn complexity(mut self) -> Self {
        self.complexity = true;
        self
    }

    /// Message reported for any rule failure on this field.
    pub fn message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn fail(&self, default: impl Into<String>) -> FieldError {
        let message = self.message.map(str::to_string).unwrap_or_else(|| default.into());
        FieldError::new(self.name, message)
    }

    /// Check one value; `Ok(None)` means an absent optional field.
    fn check(&self, value: Option<&Value>) -> Result<Option<Value>, FieldError> {
        let value = match value {
            None | Some(Value::Null) if self.required => {
                return Err(self.fail(format!("{} is required", self.name)));
            }
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };

        match self.kind {
            Kind::Boolean => value
                .as_bool()
                .map(|b| Some(Value::Bool(b)))
                .ok_or_else(|| self.fail(format!("{} must be a boolean", self.name))),
            Kind::Integer => value
                .as_i64()
                .map(|n| Some(Value::from(n)))
                .ok_or_else(|| self.fail(format!("{} must be an integer", self.name))),
            Kind::String | Kind::Email => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| self.fail(format!("{} must be a string", self.name)))?;
                self.check_str(raw).map(|s| Some(Value::String(s)))
            }
        }
    }

    fn check_str(&self, raw: &str) -> Result<String, FieldError> {
        let s = if self.trim { raw.trim() } else { raw };
        let len = s.chars().count();

        if let Some(min) = self.min_len
            && len < min
        {
            return Err(self.fail(format!("{} must be at least {min} characters", self.name)));
        }
        if let Some(max) = self.max_len
            && len > max
        {
            return Err(self.fail(format!("{} must be at most {max} characters", self.name)));
        }
        if let Some(class) = self.charset
            && !s.chars().all(|c| class.admits(c))
        {
            return Err(self.fail(format!("{} contains invalid characters", self.name)));
        }
        if self.complexity && !meets_complexity(s) {
            return Err(self.fail(format!(
                "{} must contain uppercase, lowercase, number, and special character",
                self.name
            )));
        }
        if self.kind == Kind::Email {
            if !s.validate_email() || s.is_empty() {
                return Err(self.fail(format!("{} must be a valid email address", self.name)));
            }
            return Ok(normalize_email(s));
        }
        Ok(s.to_string())
    }
}

/// Case-normalize an email for comparison and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn meets_complexity(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
}

/// Ordered set of declared fields.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validate a parsed body. Non-object bodies fail with a single
    /// [`BODY_PATH`] error.
    pub fn validate(&self, body: &Value) -> Result<Sanitized, FieldErrors> {
        let Some(object) = body.as_object() else {
            return Err(FieldError::new(BODY_PATH, "Request body must be a JSON object").into());
        };

        let mut sanitized = Map::new();
        let mut errors = FieldErrors::new();
        for field in &self.fields {
            match field.check(object.get(field.name)) {
                Ok(Some(v)) => {
                    sanitized.insert(field.name.to_string(), v);
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(sanitized)
        } else {
            Err(errors)
        }
    }

    /// Validate and deserialize the sanitized body into `T`.
    pub fn validate_into<T: DeserializeOwned>(&self, body: &Value) -> Result<T, FieldErrors> {
        let sanitized = self.validate(body)?;
        serde_json::from_value(Value::Object(sanitized))
            .map_err(|e| FieldError::new(BODY_PATH, format!("Request body has the wrong shape: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile_schema() -> Schema {
        Schema::new()
            .field(Field::string("username").length(3, 20))
            .field(Field::email("email"))
    }

    #[test]
    fn accepts_valid_body() {
        let out = profile_schema()
            .validate(&json!({"username": "testuser", "email": "test@example.com"}))
            .unwrap();
        assert_eq!(out["username"], "testuser");
        assert_eq!(out["email"], "test@example.com");
    }

    #[test]
    fn strips_undeclared_fields() {
        let out = profile_schema()
            .validate(&json!({
                "username": "testuser",
                "email": "test@example.com",
                "extraField": "should be stripped",
                "isAdmin": true
            }))
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out.contains_key("extraField"));
        assert!(!out.contains_key("isAdmin"));
    }

    #[test]
    fn reports_every_offending_field() {
        let errors = profile_schema()
            .validate(&json!({"username": "ab", "email": "invalid-email"}))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.has("username"));
        assert!(errors.has("email"));
    }

    #[test]
    fn missing_required_field_is_reported() {
        let errors = profile_schema()
            .validate(&json!({"username": "testuser"}))
            .unwrap_err();
        assert!(errors.has("email"));
        assert!(!errors.has("username"));
    }

    #[test]
    fn null_counts_as_missing() {
        let errors = profile_schema()
            .validate(&json!({"username": null, "email": "a@b.co"}))
            .unwrap_err();
        assert!(errors.has("username"));
    }

    #[test]
    fn wrong_type_is_reported_not_coerced() {
        let errors = profile_schema()
            .validate(&json!({"username": 12345, "email": {"$ne": null}}))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn non_object_bodies_fail_validation() {
        for body in [json!([{"username": "test"}]), json!("text"), json!(42), json!(null)] {
            let errors = profile_schema().validate(&body).unwrap_err();
            assert!(errors.has(BODY_PATH), "body {body} should fail");
        }
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let out = profile_schema()
            .validate(&json!({"username": "testuser", "email": "  TEST@Example.COM "}))
            .unwrap();
        assert_eq!(out["email"], "test@example.com");
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let schema = Schema::new()
            .field(Field::string("bio").optional())
            .field(Field::boolean("public").optional());
        assert!(schema.validate(&json!({})).unwrap().is_empty());
        assert!(schema.validate(&json!({"public": "yes"})).is_err());
    }

    #[test]
    fn integer_kind_rejects_floats_and_strings() {
        let schema = Schema::new().field(Field::integer("age"));
        assert!(schema.validate(&json!({"age": 3})).is_ok());
        assert!(schema.validate(&json!({"age": 3.5})).is_err());
        assert!(schema.validate(&json!({"age": "3"})).is_err());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let schema = Schema::new().field(Field::string("name").length(1, 3));
        assert!(schema.validate(&json!({"name": "ééé"})).is_ok());
    }

    #[test]
    fn custom_message_overrides_defaults() {
        let schema = Schema::new().field(Field::string("name").length(3, 5).message("Bad name"));
        let errors = schema.validate(&json!({"name": "x"})).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().message, "Bad name");
    }

    #[test]
    fn validate_into_deserializes_sanitized_body() {
        #[derive(serde::Deserialize)]
        struct Profile {
            username: String,
            email: String,
        }
        let p: Profile = profile_schema()
            .validate_into(&json!({"username": "testuser", "email": "A@B.CO", "x": 1}))
            .unwrap();
        assert_eq!(p.username, "testuser");
        assert_eq!(p.email, "a@b.co");
    }
}
