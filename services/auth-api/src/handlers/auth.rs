//! Authentication handlers (register, login, refresh, me)

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use gatekeep_auth_core::{AuthError, AuthOutcome};
use gatekeep_types::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, UserProfile};

use crate::error::ApiResult;
use crate::extractors::{ApiJson, AuthUser};
use crate::state::AppState;

fn auth_response(outcome: AuthOutcome) -> Json<AuthResponse> {
    Json(AuthResponse::new(outcome.user, outcome.tokens))
}

/// POST /api/auth/register
///
/// Create an account and return its first token pair
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let outcome = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, auth_response(outcome)))
}

/// POST /api/auth/login
///
/// Password login; repeated failures lock the account
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let outcome = state.auth.login(&req.email, &req.password).await?;
    Ok(auth_response(outcome))
}

/// POST /api/auth/refresh
///
/// Exchange a refresh token for a new pair
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let outcome = state
        .auth
        .refresh(&req.refresh_token)
        .await
        .map_err(refresh_rejection)?;
    Ok(auth_response(outcome))
}

/// A refresh token for a vanished account is just an invalid refresh token
fn refresh_rejection(err: AuthError) -> AuthError {
    match err {
        AuthError::UserNotFound => AuthError::RefreshInvalid,
        other => other,
    }
}

/// GET /api/auth/me
///
/// Profile of the bearer
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ApiResult<Json<UserProfile>> {
    let user = state.auth.me(claims.user_id).await?;
    Ok(Json(user))
}
