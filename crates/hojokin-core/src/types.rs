use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a user (UUIDv7: time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies one subsidy application record; doubles as the collaboration room key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ApplicationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Account role. Admins can see every application and manage users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Lifecycle of a subsidy application.
///
/// ```text
/// DRAFT ──► GENERATING ──► EDITING ──► COMPLETED ──► SUBMITTED
///   │           │            ▲  │          │
///   └───────────┼────────────┘  └──────────┘ (back to EDITING)
///               ▼
///             FAILED ──► GENERATING | EDITING | DRAFT
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    Generating,
    Editing,
    Completed,
    Submitted,
    Failed,
}

impl ApplicationStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    /// Staying in the same state is never a transition.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Draft, Generating)
                | (Draft, Editing)
                | (Generating, Editing)
                | (Generating, Failed)
                | (Editing, Generating)
                | (Editing, Completed)
                | (Editing, Draft)
                | (Completed, Submitted)
                | (Completed, Editing)
                | (Failed, Generating)
                | (Failed, Editing)
                | (Failed, Draft)
        )
    }

    /// Plan fields may only be edited while no generation runs and
    /// the application has not been submitted.
    pub fn is_editable(self) -> bool {
        !matches!(self, ApplicationStatus::Generating | ApplicationStatus::Submitted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Generating => "GENERATING",
            ApplicationStatus::Editing => "EDITING",
            ApplicationStatus::Completed => "COMPLETED",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ApplicationStatus::Draft),
            "GENERATING" => Ok(ApplicationStatus::Generating),
            "EDITING" => Ok(ApplicationStatus::Editing),
            "COMPLETED" => Ok(ApplicationStatus::Completed),
            "SUBMITTED" => Ok(ApplicationStatus::Submitted),
            "FAILED" => Ok(ApplicationStatus::Failed),
            other => Err(format!("unknown application status: {}", other)),
        }
    }
}
