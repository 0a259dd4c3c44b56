//! Background drafting started by `POST /api/applications/{id}/generate`.

use std::sync::Arc;

use hojokin_applications::{Application, SubsidyProgram};
use hojokin_notifications::{NewNotification, NotificationKind};
use hojokin_users::User;
use tracing::{info, instrument, warn};

use crate::app::AppState;
use crate::notify;

/// What to draft once the application is in GENERATING.
pub struct GenerationJob {
    pub application: Application,
    pub program: SubsidyProgram,
    pub company: User,
    /// Redraft only this section and merge it into the existing content.
    pub section: Option<String>,
}

/// Draft, store the outcome, and tell the owner. Always leaves the
/// application out of GENERATING.
#[instrument(skip_all, fields(application_id = %job.application.id))]
pub async fn run(state: Arc<AppState>, job: GenerationJob) {
    let GenerationJob {
        application: app,
        program,
        company,
        section,
    } = job;

    let outcome = match state
        .drafts
        .generate(&program, &company, &app, section.as_deref())
        .await
    {
        Ok(content) => state
            .applications
            .complete_generation(&app.id, content, section.is_some())
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let new = match outcome {
        Ok(done) => {
            info!(status = %done.status, "draft stored");
            NewNotification {
                user_id: app.owner_id.clone(),
                kind: NotificationKind::GenerationCompleted,
                title: "AI下書きが完成しました".to_string(),
                body: format!("「{}」の下書きを作成しました。内容を確認して編集してください。", app.title),
                application_id: Some(app.id.clone()),
            }
        }
        Err(reason) => {
            if let Err(e) = state.applications.fail_generation(&app.id, &reason) {
                warn!(error = %e, "could not record generation failure");
            }
            NewNotification {
                user_id: app.owner_id.clone(),
                kind: NotificationKind::GenerationFailed,
                title: "AI下書きの作成に失敗しました".to_string(),
                body: format!("「{}」の下書きを作成できませんでした: {reason}", app.title),
                application_id: Some(app.id.clone()),
            }
        }
    };

    notify::deliver(&state, new).await;
}
