use chrono::{DateTime, Utc};
use hojokin_core::types::{ApplicationId, ConnId, UserId};
use serde::{Deserialize, Serialize};

/// One connection's presence in an application room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    /// Section the user last edited or moved the cursor in.
    pub section: Option<String>,
}

/// Exclusive, TTL-bound editing right over one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionLock {
    pub application_id: ApplicationId,
    pub section: String,
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub display_name: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SectionLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn holder(&self) -> LockHolder {
        LockHolder {
            conn_id: self.conn_id.clone(),
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Who holds a lock, as reported to a rejected caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockHolder {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockReason {
    Released,
    Expired,
    Disconnect,
}

/// What a joining connection needs to render the room.
#[derive(Debug, Clone, Serialize)]
pub struct JoinSnapshot {
    pub application_id: ApplicationId,
    pub presence: Vec<Presence>,
    pub locks: Vec<SectionLock>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
    pub locks: usize,
}
