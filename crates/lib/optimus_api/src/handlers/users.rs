//! Own-profile handlers.

use axum::extract::State;
use axum::{Extension, Json};
use optimus_core::models::auth::ProfileUpdate;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{UpdateProfileRequest, UserResponse};

/// `GET /users/me`
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let identity = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserResponse {
        user: identity.view(),
    }))
}

/// `PUT /users/me`: names and profile blob only.
pub async fn update_me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let first_name = body.first_name.map(|n| n.trim().to_string());
    if first_name.as_deref().is_some_and(str::is_empty) {
        return Err(AppError::Validation("firstName cannot be empty".into()));
    }
    let update = ProfileUpdate {
        first_name,
        last_name: body.last_name,
        profile: body.profile,
    };
    let identity = state
        .users
        .update_profile(claims.sub, update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserResponse {
        user: identity.view(),
    }))
}
