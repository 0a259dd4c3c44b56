use hojokin_core::types::{ApplicationId, ConnId};
use thiserror::Error;

use crate::types::LockHolder;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("connection {0} is not registered")]
    NotConnected(ConnId),

    #[error("not a member of application room {0}")]
    NotInRoom(ApplicationId),

    #[error("section {section} is locked by {}", holder.display_name)]
    SectionLocked { section: String, holder: LockHolder },

    #[error("section {0} is locked by another connection")]
    NotLockHolder(String),

    #[error("section {0} is not locked")]
    LockNotFound(String),

    #[error("queue backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("queue backend timed out after {0} ms")]
    Timeout(u64),
}

impl CollabError {
    /// Wire code for `res` error frames.
    pub fn code(&self) -> &'static str {
        match self {
            CollabError::NotConnected(_) => "AUTH_FAILED",
            CollabError::NotInRoom(_) => "NOT_IN_ROOM",
            CollabError::SectionLocked { .. } => "SECTION_LOCKED",
            CollabError::NotLockHolder(_) => "NOT_LOCK_HOLDER",
            CollabError::LockNotFound(_) => "LOCK_NOT_FOUND",
            CollabError::Backend(_) | CollabError::Timeout(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CollabError>;
