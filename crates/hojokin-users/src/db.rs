use rusqlite::{Connection, Result};
use hojokin_core::types::UserRole;

use crate::types::User;

/// Column order every SELECT in this crate uses; see `row_to_user`.
pub(crate) const USER_COLUMNS: &str =
    "id, email, password_hash, company_name, representative_name, industry,
     employee_count, capital_yen, prefecture, phone, role, created_at, updated_at";

/// Map a SELECT row (column order from USER_COLUMNS) to a User.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    use std::str::FromStr;
    let role = UserRole::from_str(&row.get::<_, String>(10)?).unwrap_or_default();
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        company_name: row.get(3)?,
        representative_name: row.get(4)?,
        industry: row.get(5)?,
        employee_count: row.get(6)?,
        capital_yen: row.get(7)?,
        prefecture: row.get(8)?,
        phone: row.get(9)?,
        role,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Initialise the users table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    // UNIQUE(email) is the only guard against duplicate registration;
    // emails are normalised before they reach the table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            password_hash       TEXT NOT NULL,
            company_name        TEXT NOT NULL,
            representative_name TEXT NOT NULL DEFAULT '',
            industry            TEXT NOT NULL DEFAULT '',
            employee_count      INTEGER,
            capital_yen         INTEGER,
            prefecture          TEXT NOT NULL DEFAULT '',
            phone               TEXT,
            role                TEXT NOT NULL DEFAULT 'user',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );",
    )
}
