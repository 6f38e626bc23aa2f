use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        Ok(())
    }
}

/// Admin edit of a user. Absent fields are left as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<UserRole>,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<()> {
        if let Some(email) = &self.email {
            let email = email.trim();
            if email.is_empty() || !email.contains('@') {
                return Err(AppError::Validation("A valid email is required".into()));
            }
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(AppError::Validation("name cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    /// Substring match on email or name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response when creating a user (includes the API key, shown only once)
#[derive(Debug, Serialize)]
pub struct UserCreated {
    pub user: User,
    pub api_key: String,
}
