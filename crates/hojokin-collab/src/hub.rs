use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hojokin_core::types::{ApplicationId, ConnId, UserId};
use hojokin_protocol::frames::EventFrame;
use hojokin_protocol::methods::events;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CollabError, Result};
use crate::mirror::PresenceMirror;
use crate::queue::NotificationQueue;
use crate::types::{HubStats, JoinSnapshot, Presence, SectionLock, UnlockReason};

/// Encoded frames for one connection.
pub type Outbound = mpsc::Sender<String>;

type LockKey = (ApplicationId, String);

const MAX_LOCK_TTL_SECS: u64 = 24 * 60 * 60;

struct ConnEntry {
    user_id: UserId,
    display_name: String,
    tx: Outbound,
    rooms: HashSet<ApplicationId>,
}

/// In-memory collaboration state shared by every WebSocket connection.
///
/// Never holds a guard on one map while touching another, and never across
/// an `.await`.
pub struct CollabHub {
    conns: DashMap<ConnId, ConnEntry>,
    user_rooms: DashMap<UserId, HashSet<ConnId>>,
    rooms: DashMap<ApplicationId, HashMap<ConnId, Presence>>,
    locks: DashMap<LockKey, SectionLock>,
    lock_ttl: Duration,
    queue: Arc<dyn NotificationQueue>,
    mirror: Arc<dyn PresenceMirror>,
    seq: AtomicU64,
}

impl CollabHub {
    pub fn new(
        lock_ttl_secs: u64,
        queue: Arc<dyn NotificationQueue>,
        mirror: Arc<dyn PresenceMirror>,
    ) -> Self {
        Self {
            conns: DashMap::new(),
            user_rooms: DashMap::new(),
            rooms: DashMap::new(),
            locks: DashMap::new(),
            lock_ttl: Duration::seconds(lock_ttl_secs.min(MAX_LOCK_TTL_SECS) as i64),
            queue,
            mirror,
            seq: AtomicU64::new(1),
        }
    }

    pub fn lock_ttl_secs(&self) -> u64 {
        self.lock_ttl.num_seconds().max(0) as u64
    }

    pub fn queue_backend(&self) -> &str {
        self.queue.name()
    }

    /// Next event sequence number, shared by every event the gateway emits.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn event(&self, name: &str, payload: impl serde::Serialize) -> String {
        EventFrame::new(name, payload).with_seq(self.next_seq()).encode()
    }

    // ── delivery ──────────────────────────────────────────────────────────

    fn send_to(&self, conn: &ConnId, frame: String) -> bool {
        let Some(tx) = self.conns.get(conn).map(|c| c.tx.clone()) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %conn, "outbound queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id = %conn, "outbound channel closed, dropping event");
                false
            }
        }
    }

    fn room_members(&self, application: &ApplicationId) -> Vec<ConnId> {
        self.rooms
            .get(application)
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn broadcast_room(&self, application: &ApplicationId, frame: &str, except: Option<&ConnId>) {
        for member in self.room_members(application) {
            if Some(&member) != except {
                self.send_to(&member, frame.to_string());
            }
        }
    }

    fn conn_info(&self, conn: &ConnId) -> Result<(UserId, String)> {
        self.conns
            .get(conn)
            .map(|c| (c.user_id.clone(), c.display_name.clone()))
            .ok_or_else(|| CollabError::NotConnected(conn.clone()))
    }

    fn require_member(&self, conn: &ConnId, application: &ApplicationId) -> Result<()> {
        let member = self
            .rooms
            .get(application)
            .map(|r| r.contains_key(conn))
            .unwrap_or(false);
        if member {
            Ok(())
        } else {
            Err(CollabError::NotInRoom(application.clone()))
        }
    }

    fn set_presence_section(&self, conn: &ConnId, application: &ApplicationId, section: &str) {
        if let Some(mut room) = self.rooms.get_mut(application) {
            if let Some(p) = room.get_mut(conn) {
                if p.section.as_deref() != Some(section) {
                    p.section = Some(section.to_string());
                }
            }
        }
    }

    // ── connections ───────────────────────────────────────────────────────

    /// Add an authenticated connection and drain the user's offline queue.
    ///
    /// Returns the queued `notification` frames, oldest first. The caller
    /// writes them to the socket itself before anything from `tx`: the queue
    /// can hold more entries than the outbound channel, and the connection
    /// loop is not reading `tx` while it registers.
    pub async fn register(
        &self,
        conn: ConnId,
        user_id: UserId,
        display_name: impl Into<String>,
        tx: Outbound,
    ) -> Vec<String> {
        self.conns.insert(
            conn.clone(),
            ConnEntry {
                user_id: user_id.clone(),
                display_name: display_name.into(),
                tx,
                rooms: HashSet::new(),
            },
        );
        self.user_rooms
            .entry(user_id.clone())
            .or_default()
            .insert(conn.clone());

        let queued = match self.queue.drain(&user_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "could not drain notification queue");
                Vec::new()
            }
        };
        let frames: Vec<String> = queued
            .into_iter()
            .map(|raw| {
                let payload: Value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                self.event(events::NOTIFICATION, payload)
            })
            .collect();
        info!(conn_id = %conn, user_id = %user_id, queued = frames.len(), "connection registered");
        frames
    }

    /// Remove a connection: leave every room, release its locks, drop it from
    /// its user room.
    pub async fn unregister(&self, conn: &ConnId) {
        let Some((_, entry)) = self.conns.remove(conn) else {
            return;
        };

        for application in &entry.rooms {
            self.remove_from_room(conn, &entry.user_id, application).await;
        }
        self.release_conn_locks(conn, None, UnlockReason::Disconnect).await;

        if let Entry::Occupied(mut set) = self.user_rooms.entry(entry.user_id.clone()) {
            set.get_mut().remove(conn);
            if set.get().is_empty() {
                set.remove();
            }
        }
        info!(conn_id = %conn, user_id = %entry.user_id, "connection unregistered");
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.user_rooms.get(user).map_or(false, |s| !s.is_empty())
    }

    // ── rooms ─────────────────────────────────────────────────────────────

    /// Join an application room. Joining twice is a no-op apart from
    /// returning the current snapshot.
    pub async fn join(&self, conn: &ConnId, application: &ApplicationId) -> Result<JoinSnapshot> {
        let (user_id, display_name) = self.conn_info(conn)?;
        let presence = Presence {
            conn_id: conn.clone(),
            user_id,
            display_name,
            joined_at: Utc::now(),
            section: None,
        };

        // record the room on the connection first so `unregister` finds it
        match self.conns.get_mut(conn) {
            Some(mut c) => {
                c.rooms.insert(application.clone());
            }
            None => return Err(CollabError::NotConnected(conn.clone())),
        }

        let newly_joined = {
            let mut room = self.rooms.entry(application.clone()).or_default();
            if room.contains_key(conn) {
                false
            } else {
                room.insert(conn.clone(), presence.clone());
                true
            }
        };

        // unregistered while inserting: its cleanup may have missed this room
        if !self.conns.contains_key(conn) {
            self.remove_from_room(conn, &presence.user_id, application).await;
            return Err(CollabError::NotConnected(conn.clone()));
        }

        if newly_joined {
            let frame = self.event(
                events::USER_JOINED,
                json!({ "application_id": application, "user": presence }),
            );
            self.broadcast_room(application, &frame, Some(conn));
            self.mirror.joined(application, &presence).await;
            debug!(conn_id = %conn, application_id = %application, "joined room");
        }

        Ok(JoinSnapshot {
            application_id: application.clone(),
            presence: self.presence(application),
            locks: self.locks(application),
        })
    }

    pub async fn leave(&self, conn: &ConnId, application: &ApplicationId) -> Result<()> {
        let (user_id, _) = self.conn_info(conn)?;
        self.require_member(conn, application)?;
        if let Some(mut c) = self.conns.get_mut(conn) {
            c.rooms.remove(application);
        }
        self.remove_from_room(conn, &user_id, application).await;
        self.release_conn_locks(conn, Some(application), UnlockReason::Released)
            .await;
        Ok(())
    }

    async fn remove_from_room(&self, conn: &ConnId, user_id: &UserId, application: &ApplicationId) {
        let removed = match self.rooms.entry(application.clone()) {
            Entry::Occupied(mut room) => {
                let removed = room.get_mut().remove(conn).is_some();
                if room.get().is_empty() {
                    room.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        };
        if !removed {
            return;
        }
        let frame = self.event(
            events::USER_LEFT,
            json!({ "application_id": application, "conn_id": conn, "user_id": user_id }),
        );
        self.broadcast_room(application, &frame, None);
        self.mirror.left(application, conn).await;
        debug!(conn_id = %conn, application_id = %application, "left room");
    }

    pub fn presence(&self, application: &ApplicationId) -> Vec<Presence> {
        let mut list: Vec<Presence> = self
            .rooms
            .get(application)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        list
    }

    // ── edits ─────────────────────────────────────────────────────────────

    /// Forward an edit to the other members of the room.
    pub fn edit(
        &self,
        conn: &ConnId,
        application: &ApplicationId,
        section: &str,
        content: &str,
    ) -> Result<()> {
        let (user_id, display_name) = self.conn_info(conn)?;
        self.require_member(conn, application)?;

        let key = (application.clone(), section.to_string());
        if let Some(lock) = self.locks.get(&key) {
            if lock.conn_id != *conn && !lock.is_expired(Utc::now()) {
                return Err(CollabError::SectionLocked {
                    section: section.to_string(),
                    holder: lock.holder(),
                });
            }
        }

        self.set_presence_section(conn, application, section);
        let frame = self.event(
            events::EDIT,
            json!({
                "application_id": application,
                "section": section,
                "content": content,
                "conn_id": conn,
                "user_id": user_id,
                "display_name": display_name,
            }),
        );
        self.broadcast_room(application, &frame, Some(conn));
        Ok(())
    }

    pub fn cursor(
        &self,
        conn: &ConnId,
        application: &ApplicationId,
        section: &str,
        position: Value,
    ) -> Result<()> {
        let (user_id, display_name) = self.conn_info(conn)?;
        self.require_member(conn, application)?;
        self.set_presence_section(conn, application, section);
        let frame = self.event(
            events::CURSOR,
            json!({
                "application_id": application,
                "section": section,
                "position": position,
                "conn_id": conn,
                "user_id": user_id,
                "display_name": display_name,
            }),
        );
        self.broadcast_room(application, &frame, Some(conn));
        Ok(())
    }

    // ── locks ─────────────────────────────────────────────────────────────

    /// Acquire or refresh the lock on `section`. A lock past its expiry is
    /// taken over even if the sweeper has not removed it yet.
    pub async fn lock(
        &self,
        conn: &ConnId,
        application: &ApplicationId,
        section: &str,
        now: DateTime<Utc>,
    ) -> Result<SectionLock> {
        let (user_id, display_name) = self.conn_info(conn)?;
        self.require_member(conn, application)?;

        let fresh = SectionLock {
            application_id: application.clone(),
            section: section.to_string(),
            conn_id: conn.clone(),
            user_id,
            display_name,
            acquired_at: now,
            expires_at: now + self.lock_ttl,
        };

        let lock = match self.locks.entry((application.clone(), section.to_string())) {
            Entry::Occupied(mut held) => {
                let current = held.get_mut();
                if current.conn_id == *conn {
                    current.expires_at = fresh.expires_at;
                    current.clone()
                } else if current.is_expired(now) {
                    debug!(section, previous = %current.conn_id, "taking over expired lock");
                    *current = fresh.clone();
                    fresh
                } else {
                    return Err(CollabError::SectionLocked {
                        section: section.to_string(),
                        holder: current.holder(),
                    });
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh.clone());
                fresh
            }
        };

        self.set_presence_section(conn, application, section);
        let frame = self.event(events::LOCKED, &lock);
        self.broadcast_room(application, &frame, None);
        self.mirror.locked(&lock, self.lock_ttl_secs()).await;
        Ok(lock)
    }

    /// Release a lock held by `conn`.
    pub async fn unlock(&self, conn: &ConnId, application: &ApplicationId, section: &str) -> Result<()> {
        let key = (application.clone(), section.to_string());
        match self.locks.remove_if(&key, |_, l| l.conn_id == *conn) {
            Some((_, lock)) => {
                self.announce_unlock(&lock, UnlockReason::Released).await;
                Ok(())
            }
            None if self.locks.contains_key(&key) => {
                Err(CollabError::NotLockHolder(section.to_string()))
            }
            None => Err(CollabError::LockNotFound(section.to_string())),
        }
    }

    /// Drop every lock whose expiry is at or before `now`.
    pub async fn expire_locks(&self, now: DateTime<Utc>) -> Vec<SectionLock> {
        let stale: Vec<LockKey> = self
            .locks
            .iter()
            .filter(|l| l.is_expired(now))
            .map(|l| l.key().clone())
            .collect();

        let mut expired = Vec::new();
        for key in stale {
            if let Some((_, lock)) = self.locks.remove_if(&key, |_, l| l.is_expired(now)) {
                self.announce_unlock(&lock, UnlockReason::Expired).await;
                expired.push(lock);
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired section locks released");
        }
        expired
    }

    pub fn locks(&self, application: &ApplicationId) -> Vec<SectionLock> {
        let mut list: Vec<SectionLock> = self
            .locks
            .iter()
            .filter(|l| l.application_id == *application)
            .map(|l| l.value().clone())
            .collect();
        list.sort_by(|a, b| a.section.cmp(&b.section));
        list
    }

    async fn release_conn_locks(
        &self,
        conn: &ConnId,
        application: Option<&ApplicationId>,
        reason: UnlockReason,
    ) {
        let held: Vec<LockKey> = self
            .locks
            .iter()
            .filter(|l| l.conn_id == *conn && application.map_or(true, |a| l.application_id == *a))
            .map(|l| l.key().clone())
            .collect();
        for key in held {
            if let Some((_, lock)) = self.locks.remove_if(&key, |_, l| l.conn_id == *conn) {
                self.announce_unlock(&lock, reason).await;
            }
        }
    }

    async fn announce_unlock(&self, lock: &SectionLock, reason: UnlockReason) {
        let frame = self.event(
            events::UNLOCKED,
            json!({
                "application_id": lock.application_id,
                "section": lock.section,
                "conn_id": lock.conn_id,
                "user_id": lock.user_id,
                "reason": reason,
            }),
        );
        self.broadcast_room(&lock.application_id, &frame, None);
        self.mirror.unlocked(&lock.application_id, &lock.section).await;
    }

    // ── notifications ─────────────────────────────────────────────────────

    /// Push a `notification` event to every live connection of `user`, or
    /// queue it when there is none. Returns `true` when delivered live.
    pub async fn notify_user(&self, user: &UserId, payload: Value) -> Result<bool> {
        let targets: Vec<ConnId> = self
            .user_rooms
            .get(user)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        if !targets.is_empty() {
            let frame = self.event(events::NOTIFICATION, &payload);
            for conn in &targets {
                self.send_to(conn, frame.clone());
            }
            return Ok(true);
        }

        self.queue.push(user, payload.to_string()).await?;
        debug!(user_id = %user, "user offline, notification queued");
        Ok(false)
    }

    /// Send an already-encoded frame to every connection (heartbeat ticks).
    pub fn broadcast_all(&self, frame: &str) {
        let targets: Vec<ConnId> = self.conns.iter().map(|c| c.key().clone()).collect();
        for conn in targets {
            self.send_to(&conn, frame.to_string());
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.conns.len(),
            users: self.user_rooms.len(),
            rooms: self.rooms.len(),
            locks: self.locks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::NoopMirror;
    use crate::queue::{MemoryQueue, MAX_QUEUED_PER_USER};
    use hojokin_core::config::OUTBOUND_QUEUE_CAPACITY;

    fn hub() -> CollabHub {
        CollabHub::new(300, Arc::new(MemoryQueue::new()), Arc::new(NoopMirror))
    }

    struct Client {
        conn: ConnId,
        rx: mpsc::Receiver<String>,
    }

    impl Client {
        /// Decoded events received so far.
        fn events(&mut self) -> Vec<EventFrame> {
            let mut out = Vec::new();
            while let Ok(raw) = self.rx.try_recv() {
                out.push(serde_json::from_str(&raw).unwrap());
            }
            out
        }

        fn event_names(&mut self) -> Vec<String> {
            self.events().into_iter().map(|e| e.event).collect()
        }
    }

    async fn connect(hub: &CollabHub, conn: &str, user: &str) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let conn = ConnId::from(conn);
        hub.register(conn.clone(), UserId::from(user), user.to_uppercase(), tx)
            .await;
        Client { conn, rx }
    }

    fn app() -> ApplicationId {
        ApplicationId::from("app-1")
    }

    #[tokio::test]
    async fn join_broadcasts_to_peers_only_and_is_idempotent() {
        let hub = hub();
        let mut a = connect(&hub, "c-a", "alice").await;
        let mut b = connect(&hub, "c-b", "bob").await;

        hub.join(&a.conn, &app()).await.unwrap();
        let snap = hub.join(&b.conn, &app()).await.unwrap();
        assert_eq!(snap.presence.len(), 2);
        assert_eq!(a.event_names(), vec![events::USER_JOINED]);
        assert!(b.event_names().is_empty());

        hub.join(&b.conn, &app()).await.unwrap();
        assert!(a.event_names().is_empty());
        assert_eq!(hub.stats().rooms, 1);
    }

    #[tokio::test]
    async fn leave_notifies_and_removes_empty_room() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        let mut b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();

        hub.leave(&a.conn, &app()).await.unwrap();
        assert_eq!(b.event_names(), vec![events::USER_LEFT]);
        assert!(matches!(
            hub.leave(&a.conn, &app()).await,
            Err(CollabError::NotInRoom(_))
        ));

        hub.leave(&b.conn, &app()).await.unwrap();
        assert_eq!(hub.stats().rooms, 0);
    }

    #[tokio::test]
    async fn edits_reach_peers_but_not_sender() {
        let hub = hub();
        let mut a = connect(&hub, "c-a", "alice").await;
        let mut b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();
        a.events();

        hub.edit(&a.conn, &app(), "plan_details", "新しい本文").unwrap();
        assert!(a.events().is_empty());
        let got = b.events();
        assert_eq!(got.len(), 1);
        let payload = got[0].payload.as_ref().unwrap();
        assert_eq!(got[0].event, events::EDIT);
        assert_eq!(payload["content"], "新しい本文");
        assert_eq!(payload["user_id"], "alice");
        assert!(got[0].seq.is_some());

        let p = hub.presence(&app());
        assert_eq!(p[0].section.as_deref(), Some("plan_details"));
    }

    #[tokio::test]
    async fn non_members_are_rejected() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        assert!(matches!(
            hub.edit(&a.conn, &app(), "s", "x"),
            Err(CollabError::NotInRoom(_))
        ));
        assert!(matches!(
            hub.cursor(&a.conn, &app(), "s", json!(3)),
            Err(CollabError::NotInRoom(_))
        ));
        assert!(matches!(
            hub.lock(&a.conn, &app(), "s", Utc::now()).await,
            Err(CollabError::NotInRoom(_))
        ));
        assert!(matches!(
            hub.join(&ConnId::from("ghost"), &app()).await,
            Err(CollabError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn lock_is_exclusive_and_blocks_other_edits() {
        let hub = hub();
        let mut a = connect(&hub, "c-a", "alice").await;
        let b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();
        a.events();

        let now = Utc::now();
        hub.lock(&a.conn, &app(), "budget", now).await.unwrap();
        assert_eq!(a.event_names(), vec![events::LOCKED]);

        match hub.lock(&b.conn, &app(), "budget", now).await {
            Err(CollabError::SectionLocked { holder, .. }) => {
                assert_eq!(holder.user_id, UserId::from("alice"));
            }
            other => panic!("expected SectionLocked, got {other:?}"),
        }
        assert!(matches!(
            hub.edit(&b.conn, &app(), "budget", "x"),
            Err(CollabError::SectionLocked { .. })
        ));
        hub.edit(&a.conn, &app(), "budget", "x").unwrap();
        hub.edit(&b.conn, &app(), "other", "x").unwrap();
    }

    #[tokio::test]
    async fn relock_refreshes_expiry() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        hub.join(&a.conn, &app()).await.unwrap();
        let t0 = Utc::now();
        let first = hub.lock(&a.conn, &app(), "s", t0).await.unwrap();
        let t1 = t0 + Duration::seconds(200);
        let second = hub.lock(&a.conn, &app(), "s", t1).await.unwrap();
        assert_eq!(second.acquired_at, first.acquired_at);
        assert_eq!(second.expires_at, t1 + Duration::seconds(300));
        assert!(hub.expire_locks(t0 + Duration::seconds(301)).await.is_empty());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over_and_is_swept() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        let mut b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();
        let t0 = Utc::now();
        hub.lock(&a.conn, &app(), "s", t0).await.unwrap();

        let later = t0 + Duration::seconds(300);
        let taken = hub.lock(&b.conn, &app(), "s", later).await.unwrap();
        assert_eq!(taken.conn_id, b.conn);

        hub.lock(&a.conn, &app(), "t", t0).await.unwrap();
        b.events();
        let expired = hub.expire_locks(later).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].section, "t");
        let ev = b.events();
        assert_eq!(ev[0].event, events::UNLOCKED);
        assert_eq!(ev[0].payload.as_ref().unwrap()["reason"], "expired");
    }

    #[tokio::test]
    async fn unlock_rules() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        let b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();

        assert!(matches!(
            hub.unlock(&a.conn, &app(), "s").await,
            Err(CollabError::LockNotFound(_))
        ));
        hub.lock(&a.conn, &app(), "s", Utc::now()).await.unwrap();
        assert!(matches!(
            hub.unlock(&b.conn, &app(), "s").await,
            Err(CollabError::NotLockHolder(_))
        ));
        hub.unlock(&a.conn, &app(), "s").await.unwrap();
        assert!(hub.locks(&app()).is_empty());
    }

    #[tokio::test]
    async fn disconnect_releases_locks_and_presence() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        let mut b = connect(&hub, "c-b", "bob").await;
        hub.join(&a.conn, &app()).await.unwrap();
        hub.join(&b.conn, &app()).await.unwrap();
        hub.lock(&a.conn, &app(), "s", Utc::now()).await.unwrap();
        b.events();

        hub.unregister(&a.conn).await;
        let ev = b.events();
        let names: Vec<_> = ev.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec![events::USER_LEFT, events::UNLOCKED]);
        assert_eq!(ev[1].payload.as_ref().unwrap()["reason"], "disconnect");
        assert!(hub.locks(&app()).is_empty());
        assert_eq!(hub.presence(&app()).len(), 1);
        assert!(!hub.is_online(&UserId::from("alice")));
        assert_eq!(hub.stats().connections, 1);
    }

    #[tokio::test]
    async fn offline_notifications_are_returned_fifo_on_register() {
        let hub = hub();
        let alice = UserId::from("alice");
        assert!(!hub.notify_user(&alice, json!({ "n": 1 })).await.unwrap());
        assert!(!hub.notify_user(&alice, json!({ "n": 2 })).await.unwrap());

        let (tx, mut rx) = mpsc::channel(64);
        let frames = hub.register(ConnId::from("c-a"), alice.clone(), "Alice", tx).await;
        assert_eq!(frames.len(), 2);
        let first: EventFrame = serde_json::from_str(&frames[0]).unwrap();
        let second: EventFrame = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(first.event, events::NOTIFICATION);
        assert_eq!(first.payload.unwrap()["n"], 1);
        assert_eq!(second.payload.unwrap()["n"], 2);
        assert!(rx.try_recv().is_err());

        assert!(hub.notify_user(&alice, json!({ "n": 3 })).await.unwrap());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_offline_queue_survives_small_outbound_channel() {
        let hub = hub();
        let alice = UserId::from("alice");
        for n in 0..MAX_QUEUED_PER_USER {
            hub.notify_user(&alice, json!({ "n": n })).await.unwrap();
        }

        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let frames = hub.register(ConnId::from("c-a"), alice.clone(), "Alice", tx).await;
        assert_eq!(frames.len(), MAX_QUEUED_PER_USER);
        let last: EventFrame = serde_json::from_str(frames.last().unwrap()).unwrap();
        assert_eq!(last.payload.unwrap()["n"], MAX_QUEUED_PER_USER - 1);
        assert_eq!(hub.queue.len(&alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn join_from_unregistered_connection_leaves_no_presence() {
        let hub = hub();
        let a = connect(&hub, "c-a", "alice").await;
        hub.unregister(&a.conn).await;

        assert!(matches!(
            hub.join(&a.conn, &app()).await,
            Err(CollabError::NotConnected(_))
        ));
        assert!(hub.presence(&app()).is_empty());
        assert_eq!(hub.stats().rooms, 0);
    }

    #[tokio::test]
    async fn full_outbound_channel_drops_instead_of_blocking() {
        let hub = hub();
        let (tx, _rx) = mpsc::channel(1);
        let conn = ConnId::from("c-a");
        hub.register(conn.clone(), UserId::from("alice"), "Alice", tx).await;
        assert!(hub.send_to(&conn, "one".into()));
        assert!(!hub.send_to(&conn, "two".into()));
    }
}
