//! Axum extractors for authentication and request bodies

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::Json;

use gatekeep_auth_core::{AccessClaims, AuthError};

use crate::error::ApiError;
use crate::state::AppState;

/// Caller authenticated by a bearer access token
#[derive(Debug, Clone)]
pub struct AuthUser(pub AccessClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(&parts.headers)
            .map_err(|e| app_state.auth.reject_credentials(e))?;

        let claims = app_state.auth.authenticate(token).map_err(|e| {
            tracing::debug!(error = %e, "Token validation failed");
            e
        })?;

        Ok(Self(claims))
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(AuthError::TokenMissing);
    };
    let value = value.to_str().map_err(|_| AuthError::TokenInvalid)?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::TokenInvalid),
    }
}

/// `Json` whose rejection renders as the API error envelope
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
