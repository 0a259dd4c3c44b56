use hojokin_core::types::ApplicationStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Also returned when the caller does not own the record, so ids do not leak.
    #[error("application not found: {0}")]
    NotFound(String),

    #[error("subsidy program not found: {0}")]
    ProgramNotFound(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("application cannot be edited while {status}")]
    NotEditable { status: ApplicationStatus },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApplicationError>;
