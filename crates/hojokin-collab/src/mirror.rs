//! Best-effort copy of room presence and section locks into Redis so other
//! processes (admin tools, a second gateway) can see who is editing what.
//! The in-memory hub stays authoritative; mirror failures are only logged.

use async_trait::async_trait;
use hojokin_core::types::{ApplicationId, ConnId};
use tracing::warn;

use crate::backend::RedisBackend;
use crate::types::{Presence, SectionLock};

#[async_trait]
pub trait PresenceMirror: Send + Sync {
    async fn joined(&self, application: &ApplicationId, presence: &Presence);
    async fn left(&self, application: &ApplicationId, conn: &ConnId);
    async fn locked(&self, lock: &SectionLock, ttl_secs: u64);
    async fn unlocked(&self, application: &ApplicationId, section: &str);
}

pub struct NoopMirror;

#[async_trait]
impl PresenceMirror for NoopMirror {
    async fn joined(&self, _application: &ApplicationId, _presence: &Presence) {}
    async fn left(&self, _application: &ApplicationId, _conn: &ConnId) {}
    async fn locked(&self, _lock: &SectionLock, _ttl_secs: u64) {}
    async fn unlocked(&self, _application: &ApplicationId, _section: &str) {}
}

/// `HSET {prefix}:room:{app} {conn} <presence>` and
/// `SET {prefix}:lock:{app}:{section} <lock> EX ttl`.
pub struct RedisMirror {
    backend: RedisBackend,
    prefix: String,
}

impl RedisMirror {
    pub fn new(url: &str, prefix: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            backend: RedisBackend::open(url)?,
            prefix: prefix.to_string(),
        })
    }

    fn room_key(&self, application: &ApplicationId) -> String {
        format!("{}:room:{}", self.prefix, application)
    }

    fn lock_key(&self, application: &ApplicationId, section: &str) -> String {
        format!("{}:lock:{}:{}", self.prefix, application, section)
    }

    async fn run(&self, what: &str, cmd: redis::Cmd) {
        let result = self
            .backend
            .run(|mut conn| async move {
                let (): () = cmd.query_async(&mut conn).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await;
        if let Err(e) = result {
            warn!(op = what, error = %e, "presence mirror write failed");
        }
    }
}

#[async_trait]
impl PresenceMirror for RedisMirror {
    async fn joined(&self, application: &ApplicationId, presence: &Presence) {
        let json = serde_json::to_string(presence).unwrap_or_default();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.room_key(application))
            .arg(presence.conn_id.as_str())
            .arg(json);
        self.run("joined", cmd).await;
    }

    async fn left(&self, application: &ApplicationId, conn: &ConnId) {
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(self.room_key(application)).arg(conn.as_str());
        self.run("left", cmd).await;
    }

    async fn locked(&self, lock: &SectionLock, ttl_secs: u64) {
        let json = serde_json::to_string(lock).unwrap_or_default();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.lock_key(&lock.application_id, &lock.section))
            .arg(json)
            .arg("EX")
            .arg(ttl_secs.max(1));
        self.run("locked", cmd).await;
    }

    async fn unlocked(&self, application: &ApplicationId, section: &str) {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.lock_key(application, section));
        self.run("unlocked", cmd).await;
    }
}
