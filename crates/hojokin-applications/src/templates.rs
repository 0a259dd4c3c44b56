use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ApplicationError, Result};
use crate::types::{NewTemplate, Template, TemplateUpdate};

/// Upper bound on a single template body, in characters.
pub const MAX_TEMPLATE_CHARS: usize = 20_000;

const TEMPLATE_COLUMNS: &str = "id, owner_id, name, category, body, created_at, updated_at";

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn validate(name: &str, body: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ApplicationError::Invalid("template name is required".to_string()));
    }
    if body.trim().is_empty() {
        return Err(ApplicationError::Invalid("template body is required".to_string()));
    }
    if body.chars().count() > MAX_TEMPLATE_CHARS {
        return Err(ApplicationError::Invalid(format!(
            "template body exceeds {MAX_TEMPLATE_CHARS} characters"
        )));
    }
    Ok(())
}

/// Per-user text snippets. Every operation is scoped to the owner; another
/// user's template id behaves exactly like a missing one.
pub struct TemplateStore {
    db: Mutex<Connection>,
}

impl TemplateStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    #[instrument(skip(self, new))]
    pub fn create(&self, owner_id: &str, new: NewTemplate) -> Result<Template> {
        validate(&new.name, &new.body)?;
        let now = Utc::now().to_rfc3339();
        let template = Template {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.to_string(),
            name: new.name.trim().to_string(),
            category: new.category.filter(|c| !c.trim().is_empty()),
            body: new.body,
            created_at: now.clone(),
            updated_at: now,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            &format!("INSERT INTO templates ({TEMPLATE_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7)"),
            params![
                template.id,
                template.owner_id,
                template.name,
                template.category,
                template.body,
                template.created_at,
                template.updated_at,
            ],
        )?;
        info!(template_id = %template.id, "template created");
        Ok(template)
    }

    /// Owner's templates, optionally filtered by category.
    pub fn list(&self, owner_id: &str, category: Option<&str>) -> Result<Vec<Template>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates
             WHERE owner_id = ?1 AND (?2 IS NULL OR category = ?2)
             ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![owner_id, category], row_to_template)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, owner_id: &str, id: &str) -> Result<Template> {
        let db = self.db.lock().unwrap();
        load(&db, owner_id, id)
    }

    #[instrument(skip(self, update))]
    pub fn update(&self, owner_id: &str, id: &str, update: TemplateUpdate) -> Result<Template> {
        let db = self.db.lock().unwrap();
        let mut t = load(&db, owner_id, id)?;
        if let Some(name) = update.name {
            t.name = name.trim().to_string();
        }
        if let Some(category) = update.category {
            t.category = Some(category).filter(|c| !c.trim().is_empty());
        }
        if let Some(body) = update.body {
            t.body = body;
        }
        validate(&t.name, &t.body)?;
        t.updated_at = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE templates SET name=?2, category=?3, body=?4, updated_at=?5 WHERE id=?1",
            params![t.id, t.name, t.category, t.body, t.updated_at],
        )?;
        Ok(t)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM templates WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        if n == 0 {
            return Err(ApplicationError::TemplateNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn load(conn: &Connection, owner_id: &str, id: &str) -> Result<Template> {
    match conn.query_row(
        &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1 AND owner_id = ?2"),
        params![id, owner_id],
        row_to_template,
    ) {
        Ok(t) => Ok(t),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(ApplicationError::TemplateNotFound(id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hojokin_core::types::UserRole;
    use hojokin_users::NewUser;

    fn store_with_users() -> (TemplateStore, String, String) {
        let conn = Connection::open_in_memory().unwrap();
        hojokin_users::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let mut ids = Vec::new();
        for email in ["a@example.jp", "b@example.jp"] {
            let new = NewUser {
                email: email.into(),
                password: String::new(),
                company_name: "合同会社テスト".into(),
                representative_name: String::new(),
                industry: String::new(),
                employee_count: None,
                capital_yen: None,
                prefecture: String::new(),
                phone: None,
            };
            ids.push(
                hojokin_users::accounts::create_user(&conn, &new, "x", UserRole::User)
                    .unwrap()
                    .id,
            );
        }
        let b = ids.pop().unwrap();
        let a = ids.pop().unwrap();
        (TemplateStore::new(conn), a, b)
    }

    fn tpl(name: &str, category: Option<&str>) -> NewTemplate {
        NewTemplate {
            name: name.into(),
            category: category.map(String::from),
            body: "当社は創業以来、地域の製造業を支えてきた。".into(),
        }
    }

    #[test]
    fn crud_roundtrip() {
        let (store, a, _) = store_with_users();
        let t = store.create(&a, tpl("会社紹介", Some("概要"))).unwrap();
        assert_eq!(store.get(&a, &t.id).unwrap().name, "会社紹介");

        let updated = store
            .update(
                &a,
                &t.id,
                TemplateUpdate {
                    body: Some("改訂版".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.body, "改訂版");
        assert_eq!(updated.category.as_deref(), Some("概要"));

        store.delete(&a, &t.id).unwrap();
        assert!(matches!(store.get(&a, &t.id), Err(ApplicationError::TemplateNotFound(_))));
    }

    #[test]
    fn owner_scoping() {
        let (store, a, b) = store_with_users();
        let t = store.create(&a, tpl("強み", None)).unwrap();
        assert!(matches!(store.get(&b, &t.id), Err(ApplicationError::TemplateNotFound(_))));
        assert!(matches!(store.delete(&b, &t.id), Err(ApplicationError::TemplateNotFound(_))));
        assert!(store.list(&b, None).unwrap().is_empty());
        assert_eq!(store.list(&a, None).unwrap().len(), 1);
    }

    #[test]
    fn category_filter() {
        let (store, a, _) = store_with_users();
        store.create(&a, tpl("one", Some("効果"))).unwrap();
        store.create(&a, tpl("two", Some("課題"))).unwrap();
        store.create(&a, tpl("three", None)).unwrap();
        assert_eq!(store.list(&a, Some("効果")).unwrap().len(), 1);
        assert_eq!(store.list(&a, None).unwrap().len(), 3);
    }

    #[test]
    fn validation() {
        let (store, a, _) = store_with_users();
        assert!(matches!(store.create(&a, tpl("  ", None)), Err(ApplicationError::Invalid(_))));
        let mut huge = tpl("big", None);
        huge.body = "あ".repeat(MAX_TEMPLATE_CHARS + 1);
        assert!(matches!(store.create(&a, huge), Err(ApplicationError::Invalid(_))));
    }
}
