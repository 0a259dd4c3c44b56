//! Shared Redis connection for the queue and the mirror.

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use crate::error::{CollabError, Result};

/// Upper bound for one Redis round trip, connecting included.
pub const REDIS_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// One auto-reconnecting connection, opened on first use and reused after.
pub(crate) struct RedisBackend {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisBackend {
    /// Only parses the URL; no connection is made until first use.
    pub(crate) fn open(url: &str) -> std::result::Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> redis::RedisResult<ConnectionManager> {
        self.conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await
            .cloned()
    }

    /// Run `op` on the shared connection within `REDIS_OP_TIMEOUT`.
    pub(crate) async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let attempt = async {
            let conn = self.connection().await?;
            op(conn).await
        };
        match tokio::time::timeout(REDIS_OP_TIMEOUT, attempt).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CollabError::Timeout(REDIS_OP_TIMEOUT.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_fails_within_the_bound() {
        let backend = RedisBackend::open("redis://127.0.0.1:1").unwrap();
        let started = std::time::Instant::now();
        let result = backend
            .run(|mut conn| async move {
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(pong)
            })
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < REDIS_OP_TIMEOUT + Duration::from_secs(1));
    }
}
