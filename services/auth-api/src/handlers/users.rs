//! User lookup

use axum::extract::{Path, State};
use axum::Json;

use gatekeep_auth_core::AuthError;
use gatekeep_types::{Role, UserId, UserProfile};

use crate::error::ApiResult;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /api/users/:id
///
/// Users can read their own profile; anyone else's needs moderator or above.
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let target = UserId::parse(&id).map_err(|_| AuthError::UserNotFound)?;

    if target != claims.user_id {
        state.auth.authorize(&claims, Role::Moderator)?;
    }

    let profile = state.auth.me(target).await?;
    Ok(Json(profile))
}
