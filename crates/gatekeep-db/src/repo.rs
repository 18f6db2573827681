//! Repository traits
//!
//! Define async repository interfaces for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::AccountRow;

/// Account repository trait
///
/// Lockout fields are written with [`AccountRepository::update_lockout`] only;
/// callers serialize those writes per account.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find an account by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<AccountRow>>;

    /// Find an account by (normalized) email
    async fn find_by_email(&self, email: &str) -> DbResult<Option<AccountRow>>;

    /// Create a new account. Fails with `DbError::Conflict` on duplicate email.
    async fn create(&self, account: CreateAccount) -> DbResult<AccountRow>;

    /// Overwrite the failed-attempt counter and lock deadline
    async fn update_lockout(
        &self,
        id: Uuid,
        failed_attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> DbResult<()>;

    /// Atomically increment the token version, returning the new value
    async fn bump_token_version(&self, id: Uuid) -> DbResult<i64>;

    /// Change the account role
    async fn update_role(&self, id: Uuid, role: &str) -> DbResult<()>;

    /// Delete an account
    async fn delete(&self, id: Uuid) -> DbResult<()>;
}

/// Create account input
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}
