//! REST error envelope: `{ "error": { "code": "NOT_FOUND", "message": "..." } }`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hojokin_applications::ApplicationError;
use hojokin_core::HojokinError;
use hojokin_notifications::NotificationError;
use hojokin_users::UserError;
use serde_json::json;
use tracing::warn;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PARAMS", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "AUTH_FAILED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "PERMISSION_DENIED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Log the real cause, hand the client a generic message.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        warn!(error = %cause, "internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound(_) => ApiError::not_found(e.to_string()),
            UserError::AlreadyExists(_) => ApiError::new(StatusCode::CONFLICT, "CONFLICT", e.to_string()),
            UserError::InvalidCredentials | UserError::InvalidToken(_) | UserError::TokenExpired => {
                ApiError::unauthorized(e.to_string())
            }
            UserError::Invalid(_) => ApiError::bad_request(e.to_string()),
            UserError::Hashing(_) | UserError::DatabaseError(_) => ApiError::internal(e),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::NotFound(_)
            | ApplicationError::ProgramNotFound(_)
            | ApplicationError::TemplateNotFound(_) => ApiError::not_found(e.to_string()),
            ApplicationError::InvalidTransition { .. } => {
                ApiError::new(StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string())
            }
            ApplicationError::NotEditable { .. } => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", e.to_string())
            }
            ApplicationError::Invalid(_) => ApiError::bad_request(e.to_string()),
            ApplicationError::Database(_) | ApplicationError::Serialization(_) => ApiError::internal(e),
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::NotFound(_) => ApiError::not_found(e.to_string()),
            NotificationError::Database(_) => ApiError::internal(e),
        }
    }
}

impl From<HojokinError> for ApiError {
    fn from(e: HojokinError) -> Self {
        let status = match e {
            HojokinError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            HojokinError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            HojokinError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            HojokinError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => return ApiError::internal(e),
        };
        ApiError::new(status, e.code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hojokin_core::types::ApplicationStatus;

    #[test]
    fn domain_errors_map_to_statuses() {
        let e = ApiError::from(UserError::InvalidCredentials);
        assert_eq!((e.status, e.code), (StatusCode::UNAUTHORIZED, "AUTH_FAILED"));

        let e = ApiError::from(ApplicationError::InvalidTransition {
            from: ApplicationStatus::Generating,
            to: ApplicationStatus::Generating,
        });
        assert_eq!((e.status, e.code), (StatusCode::CONFLICT, "INVALID_TRANSITION"));

        let e = ApiError::from(NotificationError::NotFound("n1".into()));
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e = ApiError::from(HojokinError::PermissionDenied { reason: "admin only".into() });
        assert_eq!((e.status, e.code), (StatusCode::FORBIDDEN, "PERMISSION_DENIED"));
    }

    #[test]
    fn database_errors_hide_details() {
        let e = ApiError::from(ApplicationError::Database(rusqlite::Error::InvalidQuery));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "INTERNAL_ERROR");
        assert_eq!(e.message, "internal server error");
    }
}
