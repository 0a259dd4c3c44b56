use axum::{
    extract::{Path, State},
    Json,
};
use hojokin_applications::SubsidyProgram;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::ApiResult;

/// GET /api/programs
pub async fn list(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<SubsidyProgram>>> {
    Ok(Json(state.applications.programs()?))
}

/// GET /api/programs/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SubsidyProgram>> {
    Ok(Json(state.applications.program(&id)?))
}
