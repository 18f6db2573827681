//! Auth errors

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No bearer token supplied
    #[error("authentication token missing")]
    TokenMissing,

    /// Access token past its expiry
    #[error("token expired")]
    TokenExpired,

    /// Malformed, wrongly signed or wrong-purpose access token
    #[error("invalid token")]
    TokenInvalid,

    /// Refresh token failed verification for any reason
    #[error("invalid refresh token")]
    RefreshInvalid,

    /// Authenticated but the role is not sufficient
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// Too many failed logins
    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    /// Unknown email or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    UserNotFound,

    #[error("email already registered")]
    EmailTaken,

    /// Rejected request input
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TokenMissing
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::RefreshInvalid
            | Self::InvalidCredentials => 401,
            Self::InsufficientPermissions => 403,
            Self::UserNotFound => 404,
            Self::AccountLocked { .. } => 423,
            Self::EmailTaken | Self::Validation(_) => 400,
            Self::Database(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TokenMissing => "TOKEN_MISSING",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::RefreshInvalid => "REFRESH_INVALID",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the detail message is safe to show to API callers
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

impl From<gatekeep_db::DbError> for AuthError {
    fn from(err: gatekeep_db::DbError) -> Self {
        match err {
            gatekeep_db::DbError::NotFound => Self::UserNotFound,
            gatekeep_db::DbError::Conflict(_) => Self::EmailTaken,
            other => {
                tracing::error!("Database error: {}", other);
                Self::Database(other.to_string())
            }
        }
    }
}

impl From<crate::config::AuthConfigError> for AuthError {
    fn from(err: crate::config::AuthConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
