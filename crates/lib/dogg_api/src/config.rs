//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use dogg_core::auth::jwt::DEFAULT_TTL_SECS;
use dogg_core::auth::password::{DEFAULT_COST, MAX_COST, MIN_COST};
use dogg_core::rate_limit::{DEFAULT_MAX_KEYS, RateLimitPolicy};
use thiserror::Error;

/// Default request body ceiling: 10 MiB.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// A configuration variable that could not be parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Rate limiter settings for the general and authentication limiters.
#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    /// Explicit switch; `false` turns both limiters into pass-throughs.
    pub enabled: bool,
    pub general: RateLimitPolicy,
    pub auth: RateLimitPolicy,
    /// Period of the background sweep of expired windows.
    pub sweep_interval: Duration,
    /// Use the first `X-Forwarded-For` hop as the client key.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            general: RateLimitPolicy::new(FIFTEEN_MINUTES, 100),
            auth: RateLimitPolicy::new(FIFTEEN_MINUTES, 5),
            sweep_interval: Duration::from_secs(60),
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitSettings {
    /// Default windows with limiting switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3001").
    pub bind_addr: String,
    /// Token signing secret. `None` makes every token operation fail with a
    /// configuration error.
    pub jwt_secret: Option<String>,
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub rate_limit: RateLimitSettings,
    /// Allowed CORS origin.
    pub web_app_url: String,
    pub body_limit_bytes: usize,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("rate_limit", &self.rate_limit)
            .field("web_app_url", &self.web_app_url)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".into(),
            jwt_secret: None,
            token_ttl_secs: DEFAULT_TTL_SECS,
            bcrypt_cost: DEFAULT_COST,
            rate_limit: RateLimitSettings::default(),
            web_app_url: "http://localhost:3000".into(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `BIND_ADDR`                   | `127.0.0.1:3001`        |
    /// | `JWT_SECRET`                  | unset (fail safe)       |
    /// | `TOKEN_TTL_SECS`              | `86400`                 |
    /// | `BCRYPT_COST`                 | `12`                    |
    /// | `RATE_LIMIT_ENABLED`          | `true`                  |
    /// | `RATE_LIMIT_WINDOW_SECS`      | `900`                   |
    /// | `RATE_LIMIT_MAX`              | `100`                   |
    /// | `AUTH_RATE_LIMIT_WINDOW_SECS` | `900`                   |
    /// | `AUTH_RATE_LIMIT_MAX`         | `5`                     |
    /// | `RATE_LIMIT_MAX_CLIENTS`      | `100000`                |
    /// | `RATE_LIMIT_SWEEP_SECS`       | `60`                    |
    /// | `TRUST_FORWARDED_FOR`         | `false`                 |
    /// | `WEB_APP_URL`                 | `http://localhost:3000` |
    /// | `BODY_LIMIT_BYTES`            | `10485760`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let limits = RateLimitSettings::default();
        let max_keys = parse_or(&lookup, "RATE_LIMIT_MAX_CLIENTS", DEFAULT_MAX_KEYS)?;

        let general = RateLimitPolicy::new(
            secs_or(&lookup, "RATE_LIMIT_WINDOW_SECS", limits.general.window)?,
            parse_or(&lookup, "RATE_LIMIT_MAX", limits.general.max_requests)?,
        )
        .with_max_keys(max_keys);
        let auth = RateLimitPolicy::new(
            secs_or(&lookup, "AUTH_RATE_LIMIT_WINDOW_SECS", limits.auth.window)?,
            parse_or(&lookup, "AUTH_RATE_LIMIT_MAX", limits.auth.max_requests)?,
        )
        .with_max_keys(max_keys);

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(MIN_COST..=MAX_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                var: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
                reason: format!("must be within {MIN_COST}..={MAX_COST}"),
            });
        }

        let token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", defaults.token_ttl_secs)?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_SECS",
                value: token_ttl_secs.to_string(),
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret: lookup("JWT_SECRET").filter(|s| !s.is_empty()),
            token_ttl_secs,
            bcrypt_cost,
            rate_limit: RateLimitSettings {
                enabled: bool_or(&lookup, "RATE_LIMIT_ENABLED", limits.enabled)?,
                general,
                auth,
                sweep_interval: secs_or(&lookup, "RATE_LIMIT_SWEEP_SECS", limits.sweep_interval)?,
                trust_forwarded_for: bool_or(
                    &lookup,
                    "TRUST_FORWARDED_FOR",
                    limits.trust_forwarded_for,
                )?,
            },
            web_app_url: lookup("WEB_APP_URL").unwrap_or(defaults.web_app_url),
            body_limit_bytes: parse_or(&lookup, "BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn secs_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, var, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
            reason: "must be at least one second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn bool_or<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected true or false".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = ApiConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:3001");
        assert!(cfg.jwt_secret.is_none());
        assert_eq!(cfg.token_ttl_secs, 86_400);
        assert_eq!(cfg.bcrypt_cost, 12);
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.general.max_requests, 100);
        assert_eq!(cfg.rate_limit.auth.max_requests, 5);
        assert_eq!(cfg.rate_limit.auth.window, Duration::from_secs(900));
        assert_eq!(cfg.body_limit_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = ApiConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("RATE_LIMIT_ENABLED", "false"),
            ("AUTH_RATE_LIMIT_MAX", "10"),
            ("RATE_LIMIT_MAX_CLIENTS", "50"),
            ("TRUST_FORWARDED_FOR", "yes"),
        ]))
        .unwrap();
        assert_eq!(cfg.jwt_secret.as_deref(), Some("s3cret"));
        assert!(!cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.auth.max_requests, 10);
        assert_eq!(cfg.rate_limit.general.max_keys, 50);
        assert!(cfg.rate_limit.trust_forwarded_for);
    }

    #[test]
    fn empty_secret_counts_as_unset() {
        let cfg = ApiConfig::from_lookup(lookup_from(&[("JWT_SECRET", "")])).unwrap();
        assert!(cfg.jwt_secret.is_none());
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = ApiConfig::from_lookup(lookup_from(&[("RATE_LIMIT_MAX", "lots")])).unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX"));

        let err = ApiConfig::from_lookup(lookup_from(&[("BCRYPT_COST", "40")])).unwrap_err();
        assert!(err.to_string().contains("BCRYPT_COST"));

        let err =
            ApiConfig::from_lookup(lookup_from(&[("RATE_LIMIT_ENABLED", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_ENABLED"));
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = ApiConfig {
            jwt_secret: Some("super-secret-value".into()),
            ..ApiConfig::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
