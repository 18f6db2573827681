//! Error types for the Auth API service.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatekeep_auth_core::AuthError;
use gatekeep_types::ErrorBody;
use serde_json::json;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Body missing, not JSON, or not the expected shape
    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(err) => err.error_code(),
            Self::InvalidBody(_) => "VALIDATION_ERROR",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Auth(err) if err.is_internal())
    }

    /// JSON envelope sent to the caller
    pub fn body(&self) -> ErrorBody {
        let message = if self.is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody::new(self.error_code(), message);

        match self {
            Self::Auth(AuthError::AccountLocked { until }) => {
                body.with_details(json!({ "lockUntil": until.to_rfc3339() }))
            }
            _ => body,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.is_internal() {
            tracing::error!(error = ?self, "Internal API error");
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
