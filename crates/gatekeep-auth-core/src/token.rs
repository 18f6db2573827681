//! JWT issuance and verification
//!
//! Access and refresh tokens are HS256 JWTs signed with different secrets.
//! Each carries a `typ` claim so one can never stand in for the other, and a
//! random `jti` so two pairs minted in the same second still differ.

use chrono::{DateTime, SubsecRound, Utc};
use gatekeep_types::{Role, TokenPair, TokenType, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AuthConfig, AuthConfigError};
use crate::AuthError;

/// Claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Token purpose
    pub typ: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    /// Account token version at issuance
    #[serde(default)]
    pub ver: i64,
}

/// Verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Verified refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub user_id: UserId,
    pub email: String,
    /// Token version the refresh token was issued against
    pub version: i64,
    pub token_id: String,
}

/// Issues and verifies token pairs
#[derive(Clone)]
pub struct TokenService {
    issuer: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    /// Create a token service from validated config
    pub fn new(config: &AuthConfig) -> Result<Self, AuthConfigError> {
        config.validate()?;

        let access_ttl = chrono::Duration::from_std(config.access_ttl)
            .map_err(|_| AuthConfigError::OutOfRange("access token ttl"))?;
        let refresh_ttl = chrono::Duration::from_std(config.refresh_ttl)
            .map_err(|_| AuthConfigError::OutOfRange("refresh token ttl"))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self {
            issuer: config.issuer.clone(),
            access_ttl,
            refresh_ttl,
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
        })
    }

    /// Issue a fresh access + refresh pair
    pub fn issue(&self, user_id: UserId, email: &str, role: Role) -> Result<TokenPair, AuthError> {
        self.issue_at(user_id, email, role, 0, Utc::now())
    }

    /// Issue a pair bound to an account token version
    pub fn issue_versioned(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        version: i64,
    ) -> Result<TokenPair, AuthError> {
        self.issue_at(user_id, email, role, version, Utc::now())
    }

    /// Issue a pair as of `now`
    pub fn issue_at(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        // JWT timestamps have second precision.
        let now = now.trunc_subsecs(0);
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access_token = self.sign(
            &self.claims(user_id, email, role, TokenType::Access, version, now, access_expires_at),
            &self.access_encoding,
        )?;
        let refresh_token = self.sign(
            &self.claims(user_id, email, role, TokenType::Refresh, version, now, refresh_expires_at),
            &self.refresh_encoding,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            user_id,
            role,
            issued_at: now,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Verify an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::TokenMissing);
        }

        let claims = decode::<Claims>(token, &self.access_decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!("Access token validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::TokenInvalid,
                }
            })?
            .claims;

        if claims.typ != TokenType::Access {
            tracing::debug!(typ = %claims.typ, "Wrong token type presented as access token");
            return Err(AuthError::TokenInvalid);
        }

        let user_id = UserId::parse(&claims.sub).map_err(|_| AuthError::TokenInvalid)?;
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(AuthError::TokenInvalid)?;

        Ok(AccessClaims {
            user_id,
            email: claims.email,
            role: claims.role,
            expires_at,
        })
    }

    /// Verify a refresh token; every failure is `RefreshInvalid`
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims = decode::<Claims>(token, &self.refresh_decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!("Refresh token validation failed: {}", e);
                AuthError::RefreshInvalid
            })?
            .claims;

        if claims.typ != TokenType::Refresh {
            tracing::debug!(typ = %claims.typ, "Wrong token type presented as refresh token");
            return Err(AuthError::RefreshInvalid);
        }

        let user_id = UserId::parse(&claims.sub).map_err(|_| AuthError::RefreshInvalid)?;

        Ok(RefreshClaims {
            user_id,
            email: claims.email,
            version: claims.ver,
            token_id: claims.jti,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn claims(
        &self,
        user_id: UserId,
        email: &str,
        role: Role,
        typ: TokenType,
        version: i64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Claims {
        Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            typ,
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            ver: version,
        }
    }

    fn sign(&self, claims: &Claims, key: &EncodingKey) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {e}")))
    }
}
