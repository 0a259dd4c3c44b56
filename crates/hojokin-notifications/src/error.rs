use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    /// Also returned for another user's notification.
    #[error("notification not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
