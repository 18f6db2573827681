//! Configuration for the Auth API service.

use std::str::FromStr;
use std::time::Duration;

use gatekeep_auth_core::{AuthConfig, LockoutConfig};

/// Auth API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,

    /// PostgreSQL URL; accounts are kept in memory when unset
    pub database_url: Option<String>,

    /// Auth core configuration
    pub auth: AuthConfig,

    /// Upper bound on handling a single request
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let http_port = parse_or(&lookup, "HTTP_PORT", 8080u16)?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        // Signing secrets (minimum 32 bytes each, must differ)
        let access_secret =
            lookup("JWT_ACCESS_SECRET").ok_or(ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        let refresh_secret =
            lookup("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        let access_ttl_secs = parse_or(&lookup, "ACCESS_TOKEN_TTL_SECS", 24 * 60 * 60u64)?;
        let refresh_ttl_secs = parse_or(&lookup, "REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60u64)?;

        let defaults = LockoutConfig::default();
        let lockout = LockoutConfig {
            threshold: parse_or(&lookup, "LOCKOUT_THRESHOLD", defaults.threshold)?,
            duration: Duration::from_secs(parse_or(
                &lookup,
                "LOCKOUT_DURATION_SECS",
                defaults.duration.as_secs(),
            )?),
        };

        let strict_rotation = parse_flag(&lookup, "STRICT_REFRESH_ROTATION", false)?;
        let role_selection = parse_flag(&lookup, "ALLOW_ROLE_SELECTION", false)?;

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("REQUEST_TIMEOUT_SECS"));
        }

        let mut auth = AuthConfig::try_new(access_secret, refresh_secret)
            .map_err(|e| ConfigError::AuthConfig(e.to_string()))?
            .with_access_ttl(Duration::from_secs(access_ttl_secs))
            .with_refresh_ttl(Duration::from_secs(refresh_ttl_secs))
            .with_lockout(lockout)
            .with_strict_refresh_rotation(strict_rotation)
            .with_role_selection(role_selection);

        if let Some(issuer) = lookup("JWT_ISSUER") {
            auth = auth.with_issuer(issuer);
        }

        // TTLs and the lockout threshold were applied after `try_new`
        auth.validate()
            .map_err(|e| ConfigError::AuthConfig(e.to_string()))?;

        Ok(Self {
            http_port,
            database_url,
            auth,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key)),
        },
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Auth config error: {0}")]
    AuthConfig(String),
}
