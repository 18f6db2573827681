//! In-memory account repository
//!
//! Used by tests and by the auth service when no `DATABASE_URL` is configured.
//! State lives for the lifetime of the process.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::AccountRow;
use crate::repo::{AccountRepository, CreateAccount};

/// In-memory account repository
#[derive(Default, Clone)]
pub struct InMemoryAccountRepository {
    accounts: Arc<DashMap<Uuid, AccountRow>>,
    by_email: Arc<DashMap<String, Uuid>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<AccountRow>> {
        Ok(self.accounts.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<AccountRow>> {
        Ok(self
            .by_email
            .get(email)
            .and_then(|id| self.accounts.get(id.value()).map(|r| r.value().clone())))
    }

    async fn create(&self, account: CreateAccount) -> DbResult<AccountRow> {
        // The email index entry is the uniqueness lock.
        match self.by_email.entry(account.email.clone()) {
            Entry::Occupied(_) => Err(DbError::Conflict("account already exists".to_string())),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let row = AccountRow {
                    id: account.id,
                    email: account.email,
                    password_hash: account.password_hash,
                    first_name: account.first_name,
                    last_name: account.last_name,
                    role: account.role,
                    failed_attempts: 0,
                    lock_until: None,
                    token_version: 0,
                    created_at: now,
                    updated_at: now,
                };
                self.accounts.insert(row.id, row.clone());
                slot.insert(row.id);
                Ok(row)
            }
        }
    }

    async fn update_lockout(
        &self,
        id: Uuid,
        failed_attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let mut account = self.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        account.failed_attempts = failed_attempts;
        account.lock_until = lock_until;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn bump_token_version(&self, id: Uuid) -> DbResult<i64> {
        let mut account = self.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        account.token_version += 1;
        account.updated_at = Utc::now();
        Ok(account.token_version)
    }

    async fn update_role(&self, id: Uuid, role: &str) -> DbResult<()> {
        if let Some(mut account) = self.accounts.get_mut(&id) {
            account.role = role.to_string();
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        if let Some((_, account)) = self.accounts.remove(&id) {
            self.by_email.remove(&account.email);
        }
        Ok(())
    }
}
