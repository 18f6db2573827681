//! Common error types

use thiserror::Error;

/// Errors raised while parsing shared domain types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Role string is not one of the known roles
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Token type claim is not `access` or `refresh`
    #[error("invalid token type: {0}")]
    InvalidTokenType(String),

    /// User id is not a valid UUID
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}
