//! Configuration types for the auth service

use std::time::Duration;

use thiserror::Error;

/// Minimum signing secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Rejected auth configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    #[error("{name} must be at least 32 bytes")]
    SecretTooShort { name: &'static str },

    #[error("access and refresh secrets must differ")]
    SharedSecret,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

/// Lockout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Consecutive failures that lock the account
    pub threshold: u32,
    /// How long a lock lasts
    pub duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Auth service configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret for access tokens
    pub access_secret: String,
    /// HS256 secret for refresh tokens, distinct from `access_secret`
    pub refresh_secret: String,
    /// `iss` claim stamped on and required from every token
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub lockout: LockoutConfig,
    /// Reject refresh tokens that were already exchanged
    pub strict_refresh_rotation: bool,
    /// Honour the `role` field on registration
    pub allow_role_selection: bool,
}

impl AuthConfig {
    /// Create a config with default TTLs and lockout policy
    pub fn try_new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, AuthConfigError> {
        let config = Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: "gatekeep".to_string(),
            access_ttl: Duration::from_secs(24 * 60 * 60), // 24 hours
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            lockout: LockoutConfig::default(),
            strict_refresh_rotation: false,
            allow_role_selection: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check secret strength and non-zero limits
    pub fn validate(&self) -> Result<(), AuthConfigError> {
        if self.access_secret.len() < MIN_SECRET_LEN {
            return Err(AuthConfigError::SecretTooShort {
                name: "access secret",
            });
        }
        if self.refresh_secret.len() < MIN_SECRET_LEN {
            return Err(AuthConfigError::SecretTooShort {
                name: "refresh secret",
            });
        }
        if self.access_secret == self.refresh_secret {
            return Err(AuthConfigError::SharedSecret);
        }
        if self.access_ttl.is_zero() {
            return Err(AuthConfigError::Zero("access token ttl"));
        }
        if self.refresh_ttl.is_zero() {
            return Err(AuthConfigError::Zero("refresh token ttl"));
        }
        if self.lockout.threshold == 0 {
            return Err(AuthConfigError::Zero("lockout threshold"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutConfig) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_strict_refresh_rotation(mut self, strict: bool) -> Self {
        self.strict_refresh_rotation = strict;
        self
    }

    #[must_use]
    pub fn with_role_selection(mut self, allow: bool) -> Self {
        self.allow_role_selection = allow;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("lockout", &self.lockout)
            .field("strict_refresh_rotation", &self.strict_refresh_rotation)
            .field("allow_role_selection", &self.allow_role_selection)
            .finish()
    }
}
