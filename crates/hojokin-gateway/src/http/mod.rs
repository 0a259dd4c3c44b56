pub mod applications;
pub mod auth;
pub mod health;
pub mod notifications;
pub mod programs;
pub mod templates;
pub mod users;

use std::sync::Arc;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

/// Run a blocking store call (argon2 hashing in particular) off the async
/// worker threads.
pub(crate) async fn blocking<T, E, F>(state: &Arc<AppState>, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(ApiError::internal)?
        .map_err(Into::into)
}
