//! Per-user queue of notifications that arrived while the user had no live
//! connection. Entries are JSON payload strings, oldest first.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use hojokin_core::types::UserId;
use tracing::debug;

use crate::backend::RedisBackend;
use crate::error::Result;

/// Older entries are dropped once a user has this many waiting.
pub const MAX_QUEUED_PER_USER: usize = 100;

/// Redis keys expire after a week without new entries.
const QUEUE_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn push(&self, user: &UserId, payload: String) -> Result<()>;

    /// Remove and return everything queued for `user`, oldest first.
    async fn drain(&self, user: &UserId) -> Result<Vec<String>>;

    async fn len(&self, user: &UserId) -> Result<usize>;
}

/// Process-local queue. Lost on restart.
#[derive(Default)]
pub struct MemoryQueue {
    inner: DashMap<UserId, VecDeque<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn push(&self, user: &UserId, payload: String) -> Result<()> {
        let mut q = self.inner.entry(user.clone()).or_default();
        q.push_back(payload);
        while q.len() > MAX_QUEUED_PER_USER {
            q.pop_front();
        }
        Ok(())
    }

    async fn drain(&self, user: &UserId) -> Result<Vec<String>> {
        Ok(self
            .inner
            .remove(user)
            .map(|(_, q)| q.into_iter().collect())
            .unwrap_or_default())
    }

    async fn len(&self, user: &UserId) -> Result<usize> {
        Ok(self.inner.get(user).map(|q| q.len()).unwrap_or(0))
    }
}

/// Redis list per user at `{prefix}:notifications:{user_id}`.
pub struct RedisQueue {
    backend: RedisBackend,
    prefix: String,
}

impl RedisQueue {
    /// Only parses the URL; no connection is made until first use.
    pub fn new(url: &str, prefix: &str) -> Result<Self> {
        Ok(Self {
            backend: RedisBackend::open(url)?,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, user: &UserId) -> String {
        format!("{}:notifications:{}", self.prefix, user)
    }
}

#[async_trait]
impl NotificationQueue for RedisQueue {
    fn name(&self) -> &str {
        "redis"
    }

    async fn push(&self, user: &UserId, payload: String) -> Result<()> {
        let key = self.key(user);
        self.backend
            .run(|mut conn| {
                let key = key.clone();
                async move {
                    let (): () = redis::pipe()
                        .atomic()
                        .rpush(&key, payload)
                        .ignore()
                        .ltrim(&key, -(MAX_QUEUED_PER_USER as isize), -1)
                        .ignore()
                        .expire(&key, QUEUE_TTL_SECS)
                        .ignore()
                        .query_async(&mut conn)
                        .await?;
                    Ok::<_, redis::RedisError>(())
                }
            })
            .await?;
        debug!(%key, "notification queued");
        Ok(())
    }

    async fn drain(&self, user: &UserId) -> Result<Vec<String>> {
        let key = self.key(user);
        let (items, _deleted): (Vec<String>, i64) = self
            .backend
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .lrange(&key, 0, -1)
                    .del(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(items)
    }

    async fn len(&self, user: &UserId) -> Result<usize> {
        let key = self.key(user);
        self.backend
            .run(|mut conn| async move {
                let n: usize = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(n)
            })
            .await
    }
}
