//! Terminal error mapping
//!
//! Runs after every error-phase stage. Raw [`ClientError::Http`] values
//! become typed errors; anything already typed passes through.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ClientError;

/// Classify a raw HTTP error by status and server error code.
pub fn map_error(error: ClientError) -> ClientError {
    let (status, code, message, details) = match error {
        ClientError::Http {
            status,
            code,
            message,
            details,
        } => (status, code, message, details),
        typed => return typed,
    };

    match status {
        401 => match code.as_deref() {
            Some("TOKEN_MISSING") => ClientError::TokenMissing,
            Some("TOKEN_EXPIRED") => ClientError::TokenExpired,
            Some("INVALID_CREDENTIALS") => ClientError::InvalidCredentials,
            Some("REFRESH_INVALID") => ClientError::RefreshInvalid,
            _ => ClientError::TokenInvalid,
        },
        403 => ClientError::InsufficientPermissions(message),
        404 => ClientError::NotFound(message),
        423 => ClientError::AccountLocked {
            until: details.as_ref().and_then(lock_until),
            message,
        },
        400 | 409 | 422 => ClientError::Validation { message, details },
        429 | 500..=599 => ClientError::Server { status, message },
        _ => ClientError::Http {
            status,
            code,
            message,
            details,
        },
    }
}

fn lock_until(details: &Value) -> Option<DateTime<Utc>> {
    details
        .get("lockUntil")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}
