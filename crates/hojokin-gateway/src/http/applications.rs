use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use hojokin_applications::{export, Application, ApplicationUpdate, NewApplication};
use hojokin_core::types::ApplicationStatus;
use hojokin_notifications::{NewNotification, NotificationKind};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::generation::{self, GenerationJob};
use crate::notify;

#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: ApplicationStatus,
}

#[derive(Deserialize, Default)]
pub struct GenerateRequest {
    /// Redraft a single section instead of the whole document.
    #[serde(default)]
    pub section: Option<String>,
}

/// GET /api/applications: own applications; `?all=true` lists every one
/// for admins.
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<Application>>> {
    let apps = match (q.all, user.0.is_admin()) {
        (true, true) => state.applications.list_all()?,
        (true, false) => return Err(ApiError::forbidden("admin role required for all=true")),
        (false, _) => state.applications.list_for_owner(&user.0.id)?,
    };
    Ok(Json(apps))
}

/// POST /api/applications: new applications start in DRAFT.
pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<NewApplication>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let Json(new) = payload?;
    let app = state.applications.create(&user.id, new)?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// GET /api/applications/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Application>> {
    Ok(Json(state.applications.get(user.caller(), &id)?))
}

/// PATCH /api/applications/{id}: last write wins.
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ApplicationUpdate>, JsonRejection>,
) -> ApiResult<Json<Application>> {
    let Json(update) = payload?;
    Ok(Json(state.applications.update(user.caller(), &id, update)?))
}

/// DELETE /api/applications/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.applications.delete(user.caller(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/applications/{id}/status
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> ApiResult<Json<Application>> {
    let Json(change) = payload?;
    let app = state.applications.transition(user.caller(), &id, change.status)?;

    notify::deliver(
        &state,
        NewNotification {
            user_id: app.owner_id.clone(),
            kind: NotificationKind::StatusChanged,
            title: "ステータスが変更されました".to_string(),
            body: format!("「{}」は {} になりました。", app.title, app.status),
            application_id: Some(app.id.clone()),
        },
    )
    .await;
    Ok(Json(app))
}

/// POST /api/applications/{id}/generate: starts drafting and returns 202
/// immediately. The outcome arrives as a `notification`.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let req: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    let caller = hojokin_applications::Caller::new(&user.id, user.is_admin());
    let current = state.applications.get(caller, &id)?;
    let program = state.applications.program(&current.program_id)?;
    if let Some(key) = req.section.as_deref() {
        if program.section(key).is_none() {
            return Err(ApiError::bad_request(format!(
                "program {} has no section {key}",
                program.id
            )));
        }
    }

    let app = state.applications.begin_generation(caller, &id)?;
    info!(application_id = %app.id, section = ?req.section, "generation queued");

    let job = GenerationJob {
        application: app.clone(),
        program,
        company: user,
        section: req.section,
    };
    tokio::spawn(generation::run(Arc::clone(&state), job));

    Ok((StatusCode::ACCEPTED, Json(app)))
}

/// GET /api/applications/{id}/export: Markdown document.
pub async fn export(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let app = state.applications.get(user.caller(), &id)?;
    let program = state.applications.program(&app.program_id)?;
    let owner = if app.owner_id == user.0.id {
        Some(user.0.clone())
    } else {
        state.users.get(&app.owner_id)?
    };
    let doc = export::render_markdown(&app, &program, owner.as_ref().map(|u| u.company_name.as_str()));

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"application-{}.md\"", app.id),
            ),
        ],
        doc,
    ))
}
