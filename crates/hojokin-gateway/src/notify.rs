use hojokin_core::types::UserId;
use hojokin_notifications::{NewNotification, Notification};
use tracing::warn;

use crate::app::AppState;

/// Persist a notification, then push it to the user's live connections or
/// their offline queue. Failures are logged; callers have already done the
/// work being reported on.
pub async fn deliver(state: &AppState, new: NewNotification) -> Option<Notification> {
    let user_id = UserId::from(new.user_id.as_str());
    let notification = match state.notifications.create(new) {
        Ok(n) => n,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "could not store notification");
            return None;
        }
    };

    let payload = match serde_json::to_value(&notification) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "could not encode notification");
            return Some(notification);
        }
    };
    if let Err(e) = state.hub.notify_user(&user_id, payload).await {
        warn!(user_id = %user_id, error = %e, "notification push failed");
    }
    Some(notification)
}
