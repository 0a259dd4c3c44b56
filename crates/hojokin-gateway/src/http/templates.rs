//! Reusable text snippets, private to their owner.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use hojokin_applications::{NewTemplate, Template, TemplateUpdate};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiResult;

#[derive(Deserialize, Default)]
pub struct TemplateQuery {
    pub category: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(q): Query<TemplateQuery>,
) -> ApiResult<Json<Vec<Template>>> {
    Ok(Json(state.templates.list(&user.id, q.category.as_deref())?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<NewTemplate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    let Json(new) = payload?;
    Ok((StatusCode::CREATED, Json(state.templates.create(&user.id, new)?)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Template>> {
    Ok(Json(state.templates.get(&user.id, &id)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<TemplateUpdate>, JsonRejection>,
) -> ApiResult<Json<Template>> {
    let Json(update) = payload?;
    Ok(Json(state.templates.update(&user.id, &id, update)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.templates.delete(&user.id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
