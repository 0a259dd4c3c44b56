use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use hojokin_agent::DraftGenerator;
use hojokin_applications::{ApplicationManager, TemplateStore};
use hojokin_collab::CollabHub;
use hojokin_core::config::HojokinConfig;
use hojokin_notifications::NotificationStore;
use hojokin_users::{TokenSigner, UserManager};

use crate::http::{applications, auth, health, notifications, programs, templates, users};

/// Central shared state, passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: HojokinConfig,
    pub tokens: TokenSigner,
    pub users: UserManager,
    pub applications: ApplicationManager,
    pub templates: TemplateStore,
    pub notifications: NotificationStore,
    pub drafts: DraftGenerator,
    pub hub: Arc<CollabHub>,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users", get(users::list))
        .route("/api/users/me", axum::routing::patch(users::update_me))
        .route("/api/users/me/password", post(users::change_password))
        .route("/api/users/{id}", axum::routing::delete(users::delete))
        .route("/api/users/{id}/role", axum::routing::put(users::set_role))
        .route("/api/programs", get(programs::list))
        .route("/api/programs/{id}", get(programs::get))
        .route(
            "/api/applications",
            get(applications::list).post(applications::create),
        )
        .route(
            "/api/applications/{id}",
            get(applications::get)
                .patch(applications::update)
                .delete(applications::delete),
        )
        .route("/api/applications/{id}/status", post(applications::set_status))
        .route("/api/applications/{id}/generate", post(applications::generate))
        .route("/api/applications/{id}/export", get(applications::export))
        .route("/api/templates", get(templates::list).post(templates::create))
        .route(
            "/api/templates/{id}",
            get(templates::get)
                .patch(templates::update)
                .delete(templates::delete),
        )
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(notifications::delete),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
