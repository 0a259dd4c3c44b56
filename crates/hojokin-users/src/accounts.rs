use chrono::Utc;
use hojokin_core::types::UserRole;
use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use crate::db::{row_to_user, USER_COLUMNS};
use crate::error::{Result, UserError};
use crate::types::{NewUser, User};

/// Trim and lowercase so `Foo@Example.jp ` and `foo@example.jp` collide on
/// the UNIQUE index.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(UserError::Invalid(format!("invalid email address: {email}")))
    }
}

/// Insert a brand-new user row with an already-hashed password.
/// The id is generated here so the caller has it without a follow-up query.
pub fn create_user(
    conn: &Connection,
    new: &NewUser,
    password_hash: &str,
    role: UserRole,
) -> Result<User> {
    let email = normalize_email(&new.email);
    validate_email(&email)?;
    if new.company_name.trim().is_empty() {
        return Err(UserError::Invalid("company_name is required".to_string()));
    }

    let now = Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::now_v7().to_string(),
        email,
        password_hash: password_hash.to_string(),
        company_name: new.company_name.trim().to_string(),
        representative_name: new.representative_name.trim().to_string(),
        industry: new.industry.trim().to_string(),
        employee_count: new.employee_count,
        capital_yen: new.capital_yen,
        prefecture: new.prefecture.trim().to_string(),
        phone: new.phone.clone(),
        role,
        created_at: now.clone(),
        updated_at: now,
    };

    let inserted = conn.execute(
        "INSERT INTO users (
            id, email, password_hash, company_name, representative_name, industry,
            employee_count, capital_yen, prefecture, phone, role, created_at, updated_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            user.id,
            user.email,
            user.password_hash,
            user.company_name,
            user.representative_name,
            user.industry,
            user.employee_count,
            user.capital_yen,
            user.prefecture,
            user.phone,
            user.role.to_string(),
            user.created_at,
            user.updated_at,
        ],
    );
    match inserted {
        Ok(_) => Ok(user),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(UserError::AlreadyExists(user.email))
        }
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Load a user by primary key. Returns None instead of an error when absent
/// so callers decide whether missing is exceptional in their context.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    match conn.query_row(&sql, params![user_id], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Hot path for login.
pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    match conn.query_row(&sql, params![normalize_email(email)], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Persist the company profile fields of an existing user. Always bumps updated_at.
pub fn update_profile(conn: &Connection, user: &User) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE users SET
            company_name=?2, representative_name=?3, industry=?4, employee_count=?5,
            capital_yen=?6, prefecture=?7, phone=?8, updated_at=?9
         WHERE id=?1",
        params![
            user.id,
            user.company_name,
            user.representative_name,
            user.industry,
            user.employee_count,
            user.capital_yen,
            user.prefecture,
            user.phone,
            now,
        ],
    )?;
    if rows == 0 {
        return Err(UserError::NotFound(user.id.clone()));
    }
    Ok(())
}

pub fn set_password_hash(conn: &Connection, user_id: &str, password_hash: &str) -> Result<()> {
    let rows = conn.execute(
        "UPDATE users SET password_hash=?2, updated_at=?3 WHERE id=?1",
        params![user_id, password_hash, Utc::now().to_rfc3339()],
    )?;
    if rows == 0 {
        return Err(UserError::NotFound(user_id.to_string()));
    }
    Ok(())
}

pub fn set_role(conn: &Connection, user_id: &str, role: UserRole) -> Result<()> {
    let rows = conn.execute(
        "UPDATE users SET role=?2, updated_at=?3 WHERE id=?1",
        params![user_id, role.to_string(), Utc::now().to_rfc3339()],
    )?;
    if rows == 0 {
        return Err(UserError::NotFound(user_id.to_string()));
    }
    Ok(())
}

/// All users, oldest first.
pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a user. Dependent rows in other subsystems go with it through
/// `ON DELETE CASCADE` (requires `PRAGMA foreign_keys=ON` on this connection).
pub fn delete_user(conn: &Connection, user_id: &str) -> Result<()> {
    let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    if rows == 0 {
        return Err(UserError::NotFound(user_id.to_string()));
    }
    Ok(())
}
