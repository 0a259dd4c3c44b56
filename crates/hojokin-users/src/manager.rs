use std::sync::Mutex;

use hojokin_core::types::UserRole;
use rusqlite::Connection;
use tracing::{info, instrument, warn};

use crate::accounts;
use crate::error::{Result, UserError};
use crate::password::{hash_password, validate_password, verify_password};
use crate::types::{NewUser, ProfileUpdate, User};

/// Thread-safe account service over its own SQLite connection.
pub struct UserManager {
    db: Mutex<Connection>,
}

impl UserManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Register a new account. Hashing happens before the lock is taken.
    #[instrument(skip(self, new), fields(email = %new.email))]
    pub fn register(&self, new: &NewUser, role: UserRole) -> Result<User> {
        validate_password(&new.password)?;
        let hash = hash_password(&new.password)?;
        let db = self.db.lock().unwrap();
        let user = accounts::create_user(&db, new, &hash, role)?;
        info!(user_id = %user.id, %role, "user registered");
        Ok(user)
    }

    /// Email + password login. Unknown email and wrong password produce the
    /// same error so the endpoint cannot be used to probe for accounts.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = {
            let db = self.db.lock().unwrap();
            accounts::find_by_email(&db, email)?
        };
        match user {
            Some(u) if verify_password(password, &u.password_hash) => Ok(u),
            _ => {
                warn!("login rejected");
                Err(UserError::InvalidCredentials)
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        accounts::get_user(&db, user_id)
    }

    #[instrument(skip(self, update))]
    pub fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let db = self.db.lock().unwrap();
        let mut user = accounts::get_user(&db, user_id)?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))?;
        update.apply(&mut user);
        if user.company_name.trim().is_empty() {
            return Err(UserError::Invalid("company_name is required".to_string()));
        }
        accounts::update_profile(&db, &user)?;
        accounts::get_user(&db, user_id)?.ok_or_else(|| UserError::NotFound(user_id.to_string()))
    }

    /// Change password after re-checking the current one.
    #[instrument(skip(self, current, new_password))]
    pub fn change_password(&self, user_id: &str, current: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let user = self
            .get(user_id)?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))?;
        if !verify_password(current, &user.password_hash) {
            return Err(UserError::InvalidCredentials);
        }
        let hash = hash_password(new_password)?;
        let db = self.db.lock().unwrap();
        accounts::set_password_hash(&db, user_id, &hash)?;
        info!(user_id, "password changed");
        Ok(())
    }

    pub fn set_role(&self, user_id: &str, role: UserRole) -> Result<()> {
        let db = self.db.lock().unwrap();
        accounts::set_role(&db, user_id, role)
    }

    pub fn list(&self) -> Result<Vec<User>> {
        let db = self.db.lock().unwrap();
        accounts::list_users(&db)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, user_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        accounts::delete_user(&db, user_id)?;
        info!(user_id, "user deleted");
        Ok(())
    }
}
