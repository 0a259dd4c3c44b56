//! Real-time collaboration state: who is connected, who is looking at which
//! application, which sections are locked, and notifications waiting for
//! users who are offline.
//!
//! The hub knows nothing about sockets. Each connection hands it a bounded
//! `mpsc::Sender<String>` of encoded frames and the hub pushes into it.

mod backend;
pub mod error;
pub mod hub;
pub mod mirror;
pub mod queue;
pub mod types;

pub use backend::REDIS_OP_TIMEOUT;
pub use error::CollabError;
pub use hub::{CollabHub, Outbound};
pub use mirror::{NoopMirror, PresenceMirror, RedisMirror};
pub use queue::{MemoryQueue, NotificationQueue, RedisQueue, MAX_QUEUED_PER_USER};
pub use types::{HubStats, JoinSnapshot, LockHolder, Presence, SectionLock, UnlockReason};
