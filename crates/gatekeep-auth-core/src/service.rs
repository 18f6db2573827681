//! Auth service - ties together credentials, lockout, tokens and audit

use std::sync::Arc;

use chrono::Utc;
use gatekeep_db::{AccountRepository, AccountRow, CreateAccount};
use gatekeep_types::{RegisterRequest, Role, TokenPair, UserId, UserProfile};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::{AuditEventType, AuditSink, TracingAuditSink},
    config::AuthConfig,
    lockout::{LockState, LockoutGuard},
    password::{hash_password, validate_password, verify_password},
    token::{AccessClaims, TokenService},
    AuthError,
};

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 100;

/// Profile plus freshly issued tokens
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

/// Authentication service
///
/// Provides unified interface for:
/// - Registration and password login with lockout
/// - Refresh-token exchange (optionally with strict rotation)
/// - Access-token authentication and role checks
pub struct AuthService {
    config: AuthConfig,
    tokens: TokenService,
    lockout: LockoutGuard,
    accounts: Arc<dyn AccountRepository>,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(config: AuthConfig, accounts: Arc<dyn AccountRepository>) -> Result<Self, AuthError> {
        let tokens = TokenService::new(&config)?;
        Ok(Self {
            lockout: LockoutGuard::new(config.lockout),
            tokens,
            accounts,
            audit: Arc::new(TracingAuditSink),
            config,
        })
    }

    /// Replace the audit sink
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn lockout(&self) -> &LockoutGuard {
        &self.lockout
    }

    // =========================================================================
    // Registration & Login
    // =========================================================================

    /// Create an account and sign it in
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.password)?;
        let first_name = validate_name("first name", &request.first_name)?;
        let last_name = validate_name("last name", &request.last_name)?;

        let role = match request.role {
            None | Some(Role::User) => Role::User,
            Some(role) if self.config.allow_role_selection => role,
            Some(_) => {
                return Err(AuthError::Validation(
                    "role selection is not permitted".to_string(),
                ))
            }
        };

        let password_hash = hash_password(request.password).await?;
        let account = self
            .accounts
            .create(CreateAccount {
                id: Uuid::new_v4(),
                email,
                password_hash,
                first_name,
                last_name,
                role: role.as_str().to_string(),
            })
            .await?;

        let user = profile(&account)?;
        let tokens = self
            .tokens
            .issue_versioned(user.id, &user.email, user.role, account.token_version)?;

        tracing::info!(user_id = %user.id, role = %user.role, "Account registered");
        self.audit.record(
            AuditEventType::Registered,
            Some(user.id),
            json!({ "role": user.role }),
        );

        Ok(AuthOutcome { user, tokens })
    }

    /// Password login guarded by the lockout policy
    ///
    /// The account stays locked for the whole attempt, so concurrent
    /// failures are counted one at a time and a locked account never reaches
    /// password comparison.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(email);

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            tracing::debug!("Login for unknown email");
            self.audit.record(
                AuditEventType::LoginFailed,
                None,
                json!({ "reason": "unknown_email" }),
            );
            return Err(AuthError::InvalidCredentials);
        };
        let user_id = UserId(account.id);

        let lock = self.lockout.acquire(account.id).await;
        let now = Utc::now();
        let (account, state) = lock.current(self.accounts.as_ref(), now).await?;

        if let LockState::Locked { until } = state {
            self.audit.record(
                AuditEventType::LoginRejectedLocked,
                Some(user_id),
                json!({ "lock_until": until }),
            );
            return Err(AuthError::AccountLocked { until });
        }

        if !verify_password(password.to_string(), account.password_hash.clone()).await? {
            let state = lock.record_failure(self.accounts.as_ref(), now).await?;
            let failed_attempts = match state {
                LockState::Open { failed_attempts } => failed_attempts,
                LockState::Locked { .. } => self.lockout.config().threshold,
            };
            self.audit.record(
                AuditEventType::LoginFailed,
                Some(user_id),
                json!({ "reason": "bad_password", "failed_attempts": failed_attempts }),
            );
            if let LockState::Locked { until } = state {
                self.audit.record(
                    AuditEventType::AccountLocked,
                    Some(user_id),
                    json!({ "lock_until": until }),
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        lock.record_success(self.accounts.as_ref(), &account).await?;
        drop(lock);

        let user = profile(&account)?;
        let tokens = self
            .tokens
            .issue_versioned(user.id, &user.email, user.role, account.token_version)?;

        tracing::info!(user_id = %user.id, "Login succeeded");
        self.audit
            .record(AuditEventType::LoginSucceeded, Some(user.id), json!({}));

        Ok(AuthOutcome { user, tokens })
    }

    // =========================================================================
    // Token Refresh
    // =========================================================================

    /// Exchange a refresh token for a brand-new pair
    ///
    /// The account is reloaded so deletions and role changes take effect.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthOutcome, AuthError> {
        let claims = match self.tokens.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(err) => {
                self.audit.record(
                    AuditEventType::RefreshRejected,
                    None,
                    json!({ "reason": "invalid_token" }),
                );
                return Err(err);
            }
        };
        let user_id = claims.user_id;

        // Rotation is a compare-and-bump; serialize it per account.
        let rotation_lock = if self.config.strict_refresh_rotation {
            Some(self.lockout.acquire(user_id.0).await)
        } else {
            None
        };

        let Some(account) = self.accounts.find_by_id(user_id.0).await? else {
            self.audit.record(
                AuditEventType::RefreshRejected,
                Some(user_id),
                json!({ "reason": "account_missing" }),
            );
            return Err(AuthError::UserNotFound);
        };

        let version = if rotation_lock.is_some() {
            if claims.version != account.token_version {
                tracing::warn!(user_id = %user_id, "Stale refresh token presented");
                self.audit.record(
                    AuditEventType::RefreshRejected,
                    Some(user_id),
                    json!({ "reason": "token_reused", "token_id": claims.token_id }),
                );
                return Err(AuthError::RefreshInvalid);
            }
            self.accounts.bump_token_version(account.id).await?
        } else {
            account.token_version
        };
        drop(rotation_lock);

        let user = profile(&account)?;
        let tokens = self
            .tokens
            .issue_versioned(user.id, &user.email, user.role, version)?;

        tracing::debug!(user_id = %user.id, "Token pair refreshed");
        self.audit
            .record(AuditEventType::TokenRefreshed, Some(user.id), json!({}));

        Ok(AuthOutcome { user, tokens })
    }

    // =========================================================================
    // Access checks
    // =========================================================================

    /// Verify a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        match self.tokens.verify_access(access_token) {
            Ok(claims) => {
                self.audit
                    .record(AuditEventType::AccessGranted, Some(claims.user_id), json!({}));
                Ok(claims)
            }
            Err(err) => {
                self.audit.record(
                    AuditEventType::AccessDenied,
                    None,
                    json!({ "reason": err.error_code() }),
                );
                Err(err)
            }
        }
    }

    /// Record a request whose credentials were unusable before verification
    ///
    /// Covers a missing header, a non-Bearer scheme and an empty token.
    pub fn reject_credentials(&self, err: AuthError) -> AuthError {
        self.audit.record(
            AuditEventType::AccessDenied,
            None,
            json!({ "reason": err.error_code() }),
        );
        err
    }

    /// Require at least `required` privileges
    pub fn authorize(&self, claims: &AccessClaims, required: Role) -> Result<(), AuthError> {
        if claims.role.at_least(required) {
            return Ok(());
        }
        self.audit.record(
            AuditEventType::AccessDenied,
            Some(claims.user_id),
            json!({ "reason": "INSUFFICIENT_PERMISSIONS", "required": required, "role": claims.role }),
        );
        Err(AuthError::InsufficientPermissions)
    }

    /// Current profile of an authenticated user
    pub async fn me(&self, user_id: UserId) -> Result<UserProfile, AuthError> {
        let account = self
            .accounts
            .find_by_id(user_id.0)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        profile(&account)
    }
}

fn profile(account: &AccountRow) -> Result<UserProfile, AuthError> {
    let role: Role = account.role.parse().map_err(|_| {
        tracing::error!(account_id = %account.id, role = %account.role, "Stored role is not recognised");
        AuthError::Internal("stored role is not recognised".to_string())
    })?;

    Ok(UserProfile {
        id: UserId(account.id),
        email: account.email.clone(),
        first_name: account.first_name.clone(),
        last_name: account.last_name.clone(),
        role,
        created_at: account.created_at,
    })
}

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let well_formed = email.len() <= MAX_EMAIL_LEN
        && !email.contains(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };

    if well_formed {
        Ok(())
    } else {
        Err(AuthError::Validation("email address is invalid".to_string()))
    }
}

fn validate_name(field: &str, value: &str) -> Result<String, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::Validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(value.to_string())
}
