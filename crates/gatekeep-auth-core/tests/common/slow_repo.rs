//! Repository wrapper that yields inside every call
//!
//! Widens the window between reading and writing lockout fields so that
//! unsynchronized read-modify-write would lose updates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeep_db::{AccountRepository, AccountRow, CreateAccount, DbResult, InMemoryAccountRepository};
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct SlowAccountRepository {
    inner: InMemoryAccountRepository,
    lockout_writes: Arc<AtomicUsize>,
}

impl SlowAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn lockout_writes(&self) -> usize {
        self.lockout_writes.load(Ordering::SeqCst)
    }

    async fn pause() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[async_trait]
impl AccountRepository for SlowAccountRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<AccountRow>> {
        Self::pause().await;
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<AccountRow>> {
        self.inner.find_by_email(email).await
    }

    async fn create(&self, account: CreateAccount) -> DbResult<AccountRow> {
        self.inner.create(account).await
    }

    async fn update_lockout(
        &self,
        id: Uuid,
        failed_attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        Self::pause().await;
        self.lockout_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_lockout(id, failed_attempts, lock_until).await
    }

    async fn bump_token_version(&self, id: Uuid) -> DbResult<i64> {
        Self::pause().await;
        self.inner.bump_token_version(id).await
    }

    async fn update_role(&self, id: Uuid, role: &str) -> DbResult<()> {
        self.inner.update_role(id, role).await
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        self.inner.delete(id).await
    }
}
