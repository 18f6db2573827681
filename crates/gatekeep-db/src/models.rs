//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Account row from the database
#[derive(Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    /// Consecutive failed logins since the last success or lock expiry
    pub failed_attempts: i32,
    /// Set while the account is locked out
    pub lock_until: Option<DateTime<Utc>>,
    /// Bumped on every strict refresh-token rotation
    pub token_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccountRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRow")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("failed_attempts", &self.failed_attempts)
            .field("lock_until", &self.lock_until)
            .field("token_version", &self.token_version)
            .finish_non_exhaustive()
    }
}
