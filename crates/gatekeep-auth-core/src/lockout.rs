//! Account lockout bookkeeping
//!
//! Every read-modify-write of an account's lockout fields happens while
//! holding that account's [`AccountLock`]. Distinct accounts never contend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gatekeep_db::{AccountRepository, AccountRow};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::LockoutConfig;
use crate::AuthError;

/// Lockout state of an account at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Open { failed_attempts: u32 },
    Locked { until: DateTime<Utc> },
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Serializes lockout updates per account
pub struct LockoutGuard {
    config: LockoutConfig,
    lock_duration: chrono::Duration,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LockoutGuard {
    pub fn new(config: LockoutConfig) -> Self {
        let lock_duration =
            chrono::Duration::from_std(config.duration).unwrap_or(chrono::Duration::minutes(15));
        Self {
            config,
            lock_duration,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Acquire the per-account lock, waiting for any in-flight attempt
    pub async fn acquire(&self, account_id: Uuid) -> AccountLock<'_> {
        let mutex = self.locks.entry(account_id).or_default().clone();
        let permit = mutex.lock_owned().await;
        AccountLock {
            guard: self,
            account_id,
            _permit: permit,
        }
    }

    /// Lock state of `account` at `now`
    ///
    /// An elapsed `lock_until` reads as open with a fresh counter.
    pub fn check_locked(&self, account: &AccountRow, now: DateTime<Utc>) -> LockState {
        match account.lock_until {
            Some(until) if now < until => LockState::Locked { until },
            Some(_) => LockState::Open { failed_attempts: 0 },
            None => LockState::Open {
                failed_attempts: account.failed_attempts.max(0) as u32,
            },
        }
    }

    /// Number of accounts with a live lock entry
    pub fn tracked_accounts(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive right to mutate one account's lockout fields
///
/// Dropping it releases the account for the next attempt.
pub struct AccountLock<'a> {
    guard: &'a LockoutGuard,
    account_id: Uuid,
    _permit: OwnedMutexGuard<()>,
}

impl AccountLock<'_> {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    /// Reload the account and resolve its lock state
    ///
    /// A lock that has elapsed is cleared in the store before returning.
    pub async fn current<R: AccountRepository + ?Sized>(
        &self,
        repo: &R,
        now: DateTime<Utc>,
    ) -> Result<(AccountRow, LockState), AuthError> {
        let mut account = repo
            .find_by_id(self.account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let state = self.guard.check_locked(&account, now);

        if account.lock_until.is_some() && !state.is_locked() {
            tracing::info!(account_id = %self.account_id, "Account lock expired");
            repo.update_lockout(self.account_id, 0, None).await?;
            account.failed_attempts = 0;
            account.lock_until = None;
        }

        Ok((account, state))
    }

    /// Count a failed attempt, locking the account at the threshold
    pub async fn record_failure<R: AccountRepository + ?Sized>(
        &self,
        repo: &R,
        now: DateTime<Utc>,
    ) -> Result<LockState, AuthError> {
        let account = repo
            .find_by_id(self.account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let failed_attempts = match self.guard.check_locked(&account, now) {
            LockState::Locked { until } => return Ok(LockState::Locked { until }),
            LockState::Open { failed_attempts } => failed_attempts.saturating_add(1),
        };

        let state = if failed_attempts >= self.guard.config.threshold {
            LockState::Locked {
                until: now + self.guard.lock_duration,
            }
        } else {
            LockState::Open { failed_attempts }
        };

        let lock_until = match state {
            LockState::Locked { until } => {
                tracing::warn!(
                    account_id = %self.account_id,
                    failed_attempts,
                    until = %until,
                    "Account locked after repeated failures"
                );
                Some(until)
            }
            LockState::Open { .. } => None,
        };

        let stored = i32::try_from(failed_attempts).unwrap_or(i32::MAX);
        repo.update_lockout(self.account_id, stored, lock_until)
            .await?;

        Ok(state)
    }

    /// Reset counters after a successful authentication
    pub async fn record_success<R: AccountRepository + ?Sized>(
        &self,
        repo: &R,
        account: &AccountRow,
    ) -> Result<(), AuthError> {
        if account.failed_attempts != 0 || account.lock_until.is_some() {
            repo.update_lockout(self.account_id, 0, None).await?;
        }
        Ok(())
    }
}

impl Drop for AccountLock<'_> {
    fn drop(&mut self) {
        // Map entry + our permit are the only holders: nobody is waiting.
        self.guard
            .locks
            .remove_if(&self.account_id, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}
