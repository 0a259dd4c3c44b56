use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hojokin_notifications::Notification;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiResult;

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// GET /api/notifications: newest first, plus the unread count.
pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(q): Query<NotificationQuery>,
) -> ApiResult<Json<NotificationList>> {
    let notifications = state.notifications.list(&user.id, q.unread_only, q.limit)?;
    let unread_count = state.notifications.unread_count(&user.id)?;
    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.notifications.mark_read(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.notifications.mark_all_read(&user.id)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// DELETE /api/notifications/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.notifications.delete(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
