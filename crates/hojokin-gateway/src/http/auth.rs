//! Account sign-up and sign-in. Both return a bearer token that works for
//! REST calls and the WebSocket `connect` handshake alike.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use hojokin_core::types::UserRole;
use hojokin_users::{NewUser, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::blocking;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let Json(new) = payload?;
    let user = blocking(&state, move |s| s.users.register(&new, UserRole::User)).await?;
    let token = state.tokens.issue(&user.id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(req) = payload?;
    let user = blocking(&state, move |s| s.users.authenticate(&req.email, &req.password)).await?;
    let token = state.tokens.issue(&user.id)?;
    info!(user_id = %user.id, "login");
    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
