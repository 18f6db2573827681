//! Client errors
//!
//! Every failure a caller can observe. Errors are `Clone` because a single
//! token refresh result is shared by all requests waiting on it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;

/// Client errors for Gatekeep operations.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Request requires authentication but no token is stored.
    #[error("authentication token missing")]
    TokenMissing,

    /// Access token expired and could not be renewed.
    #[error("token expired")]
    TokenExpired,

    /// Token rejected by the server, even after a refresh.
    #[error("invalid token")]
    TokenInvalid,

    /// Refresh token rejected; the session is over.
    #[error("refresh token invalid")]
    RefreshInvalid,

    #[error("insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("account locked: {message}")]
    AccountLocked {
        message: String,
        until: Option<DateTime<Utc>>,
    },

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Transport failure; never reached the server or no response.
    #[error("network error: {message}")]
    Network {
        message: String,
        /// The per-call deadline elapsed
        timeout: bool,
    },

    /// 5xx or 429 from the server.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Raw non-2xx response before the error mapper classifies it.
    #[error("http {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<Value>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The client was shut down.
    #[error("client is shut down")]
    Closed,
}

impl ClientError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status, .. } | Self::Http { status, .. } => {
                *status >= 500 || *status == 429
            }
            Self::TokenMissing
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::RefreshInvalid
            | Self::InsufficientPermissions(_)
            | Self::AccountLocked { .. }
            | Self::InvalidCredentials
            | Self::Validation { .. }
            | Self::NotFound(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Closed => false,
        }
    }

    /// HTTP status this error corresponds to, when there is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::TokenMissing
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::RefreshInvalid
            | Self::InvalidCredentials => Some(401),
            Self::InsufficientPermissions(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AccountLocked { .. } => Some(423),
            Self::Validation { .. } => Some(400),
            Self::Network { .. } | Self::Config(_) | Self::Serialization(_) | Self::Closed => None,
        }
    }

    /// Whether the per-call deadline elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network { timeout: true, .. })
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timeout: false,
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timeout: true,
        }
    }

    /// Build a raw [`ClientError::Http`] from a non-2xx response body.
    ///
    /// Understands `{"error": {"code", "message", "details"}}` and a bare
    /// `{"message"}`.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let envelope = body.get("error").filter(|e| e.is_object()).unwrap_or(body);

        let code = envelope
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| body.get("error").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {status}"));
        let details = envelope.get("details").cloned().filter(|d| !d.is_null());

        Self::Http {
            status,
            code,
            message,
            details,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
