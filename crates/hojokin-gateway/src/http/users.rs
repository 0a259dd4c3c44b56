use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use hojokin_core::types::UserRole;
use hojokin_users::{ProfileUpdate, User};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::blocking;
use crate::app::AppState;
use crate::auth::{AdminUser, AuthUser};
use crate::error::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct RoleChange {
    pub role: UserRole,
}

/// PATCH /api/users/me: update the company profile.
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(update) = payload?;
    Ok(Json(state.users.update_profile(&user.id, update)?))
}

/// POST /api/users/me/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(req) = payload?;
    blocking(&state, move |s| {
        s.users
            .change_password(&user.id, &req.current_password, &req.new_password)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users: admin only.
pub async fn list(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.users.list()?))
}

/// DELETE /api/users/{id}: admin only. Applications, templates and
/// notifications go with the account.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if id == admin.id {
        return Err(ApiError::bad_request("admins cannot delete their own account"));
    }
    state.users.delete(&id)?;
    info!(admin_id = %admin.id, user_id = %id, "user deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/users/{id}/role: admin only. An admin cannot demote themselves,
/// so at least one admin always remains.
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<RoleChange>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(req) = payload?;
    if id == admin.id && req.role != UserRole::Admin {
        return Err(ApiError::bad_request("admins cannot demote their own account"));
    }
    state.users.set_role(&id, req.role)?;
    let user = state
        .users
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(format!("user {id} not found")))?;
    info!(admin_id = %admin.id, user_id = %id, role = %req.role, "user role changed");
    Ok(Json(user))
}
