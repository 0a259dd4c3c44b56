use thiserror::Error;

#[derive(Debug, Error)]
pub enum HojokinError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HojokinError {
    /// Short error code string sent to clients in REST envelopes and WS RES frames.
    pub fn code(&self) -> &'static str {
        match self {
            HojokinError::Config(_) => "CONFIG_ERROR",
            HojokinError::AuthFailed(_) => "AUTH_FAILED",
            HojokinError::Protocol(_) => "PROTOCOL_ERROR",
            HojokinError::InvalidParams(_) => "INVALID_PARAMS",
            HojokinError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            HojokinError::PermissionDenied { .. } => "PERMISSION_DENIED",
            HojokinError::NotFound { .. } => "NOT_FOUND",
            HojokinError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HojokinError>;
