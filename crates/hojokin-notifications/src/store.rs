use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::types::{NewNotification, Notification, NotificationKind};

/// Hard cap on a single listing.
pub const MAX_LIST_LIMIT: usize = 100;

const COLUMNS: &str = "id, user_id, kind, title, body, application_id, read, created_at";

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(2)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: kind.parse().unwrap_or(NotificationKind::System),
        title: row.get(3)?,
        body: row.get(4)?,
        application_id: row.get(5)?,
        read: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

pub struct NotificationStore {
    db: Mutex<Connection>,
}

impl NotificationStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    #[instrument(skip(self, new), fields(user_id = %new.user_id, kind = %new.kind))]
    pub fn create(&self, new: NewNotification) -> Result<Notification> {
        let n = Notification {
            id: Uuid::now_v7().to_string(),
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            body: new.body,
            application_id: new.application_id,
            read: false,
            created_at: Utc::now().to_rfc3339(),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            &format!("INSERT INTO notifications ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,0,?7)"),
            params![
                n.id,
                n.user_id,
                n.kind.as_str(),
                n.title,
                n.body,
                n.application_id,
                n.created_at,
            ],
        )?;
        debug!(notification_id = %n.id, "notification stored");
        Ok(n)
    }

    /// Newest first. `limit` is clamped to `1..=MAX_LIST_LIMIT`.
    pub fn list(&self, user_id: &str, unread_only: bool, limit: usize) -> Result<Vec<Notification>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT) as i64;
        let db = self.db.lock().unwrap();
        // ids are UUIDv7, so they break created_at ties in insertion order
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![user_id, unread_only as i64, limit], row_to_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Mark one notification read. Marking an already-read one is a no-op.
    pub fn mark_read(&self, user_id: &str, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if n == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Returns how many were changed.
    pub fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            params![user_id],
        )?;
        Ok(n)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if n == 0 {
            return Err(NotificationError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NotificationStore {
        let conn = Connection::open_in_memory().unwrap();
        hojokin_users::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        NotificationStore::new(conn)
    }

    fn note(user: &str, title: &str) -> NewNotification {
        NewNotification {
            user_id: user.to_string(),
            kind: NotificationKind::GenerationCompleted,
            title: title.to_string(),
            body: String::new(),
            application_id: Some("app-1".to_string()),
        }
    }

    #[test]
    fn newest_first_and_unread_filter() {
        let s = store();
        let first = s.create(note("u1", "first")).unwrap();
        s.create(note("u1", "second")).unwrap();
        s.create(note("u2", "other user")).unwrap();

        let all = s.list("u1", false, 50).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "second");

        s.mark_read("u1", &first.id).unwrap();
        let unread = s.list("u1", true, 50).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "second");
        assert_eq!(s.unread_count("u1").unwrap(), 1);
        assert_eq!(s.unread_count("u2").unwrap(), 1);
    }

    #[test]
    fn limit_is_clamped() {
        let s = store();
        for i in 0..3 {
            s.create(note("u1", &format!("n{i}"))).unwrap();
        }
        assert_eq!(s.list("u1", false, 0).unwrap().len(), 1);
        assert_eq!(s.list("u1", false, 10_000).unwrap().len(), 3);
    }

    #[test]
    fn owner_scoped_mutations() {
        let s = store();
        let n = s.create(note("u1", "mine")).unwrap();
        assert!(matches!(s.mark_read("u2", &n.id), Err(NotificationError::NotFound(_))));
        assert!(matches!(s.delete("u2", &n.id), Err(NotificationError::NotFound(_))));
        s.delete("u1", &n.id).unwrap();
        assert!(s.list("u1", false, 10).unwrap().is_empty());
    }

    #[test]
    fn mark_all_read_counts_changes() {
        let s = store();
        s.create(note("u1", "a")).unwrap();
        s.create(note("u1", "b")).unwrap();
        assert_eq!(s.mark_all_read("u1").unwrap(), 2);
        assert_eq!(s.mark_all_read("u1").unwrap(), 0);
        assert_eq!(s.unread_count("u1").unwrap(), 0);
    }
}
