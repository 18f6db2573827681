//! Password hashing
//!
//! Argon2id runs on the blocking pool so login bursts do not stall the
//! async workers.

use argon2::{
    password_hash::{rand_core, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
};

use crate::AuthError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

fn hasher() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(15000, 2, 1, None)
        .map_err(|e| AuthError::Internal(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string
#[tracing::instrument(name = "hash_password", skip_all)]
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    let current_span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        current_span.in_scope(|| {
            let salt = SaltString::generate(rand_core::OsRng);
            hasher()?
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
        })
    })
    .await
    .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
}

/// Check a candidate password against a stored PHC hash
#[tracing::instrument(name = "verify_password", skip_all)]
pub async fn verify_password(candidate: String, expected_hash: String) -> Result<bool, AuthError> {
    let current_span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        current_span.in_scope(|| {
            let parsed = PasswordHash::new(&expected_hash)
                .map_err(|e| AuthError::Internal(format!("stored hash unreadable: {e}")))?;
            match hasher()?.verify_password(candidate.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AuthError::Internal(format!("password verification failed: {e}"))),
            }
        })
    })
    .await
    .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?
}

/// Reject passwords that fail the basic policy
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Validation("password must not be blank".to_string()));
    }
    Ok(())
}
