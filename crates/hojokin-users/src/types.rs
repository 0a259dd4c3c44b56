use hojokin_core::types::UserRole;
use serde::{Deserialize, Serialize};

/// A registered business account and its company profile.
///
/// The profile fields feed the drafting prompts, so the more a user fills
/// in here the less the model has to guess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// argon2id PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub company_name: String,
    pub representative_name: String,
    /// Free text, e.g. "金属加工業" or "IT / SaaS".
    pub industry: String,
    pub employee_count: Option<i64>,
    pub capital_yen: Option<i64>,
    pub prefecture: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Name shown to collaborators: representative, then company, then email.
    pub fn display_name(&self) -> &str {
        if !self.representative_name.trim().is_empty() {
            &self.representative_name
        } else if !self.company_name.trim().is_empty() {
            &self.company_name
        } else {
            &self.email
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub company_name: String,
    #[serde(default)]
    pub representative_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub employee_count: Option<i64>,
    #[serde(default)]
    pub capital_yen: Option<i64>,
    #[serde(default)]
    pub prefecture: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial company-profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub company_name: Option<String>,
    pub representative_name: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i64>,
    pub capital_yen: Option<i64>,
    pub prefecture: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.company_name {
            user.company_name = v;
        }
        if let Some(v) = self.representative_name {
            user.representative_name = v;
        }
        if let Some(v) = self.industry {
            user.industry = v;
        }
        if let Some(v) = self.employee_count {
            user.employee_count = Some(v);
        }
        if let Some(v) = self.capital_yen {
            user.capital_yen = Some(v);
        }
        if let Some(v) = self.prefecture {
            user.prefecture = v;
        }
        if let Some(v) = self.phone {
            user.phone = Some(v);
        }
    }
}
