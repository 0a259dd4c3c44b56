//! Bearer-token extractors for REST handlers.
//!
//! The token only proves who signed in; the user row is re-loaded on every
//! request so deleted accounts and role changes take effect immediately.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use hojokin_applications::Caller;
use hojokin_core::HojokinError;
use hojokin_users::User;
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;

/// The signed-in user.
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn caller(&self) -> Caller<'_> {
        Caller::new(&self.0.id, self.0.is_admin())
    }
}

/// The signed-in user, who must be an admin.
pub struct AdminUser(pub User);

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify `token` and load its user. Shared with the WebSocket handshake.
pub fn resolve_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.tokens.verify(token)?;
    state.users.get(&claims.user_id)?.ok_or_else(|| {
        debug!(user_id = %claims.user_id, "token for deleted account");
        ApiError::unauthorized("account no longer exists")
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers).ok_or_else(|| {
            ApiError::unauthorized("set 'Authorization: Bearer <token>' header")
        })?;
        resolve_token(state, token).map(AuthUser)
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(HojokinError::PermissionDenied {
                reason: "admin role required".to_string(),
            }
            .into());
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.123.ff"));
        assert_eq!(extract_bearer(&headers), Some("abc.123.ff"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }
}
