use chrono::DateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::normalize_account_ids;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    /// XXXX-XXXX-XXXX-XXXX over [A-Z0-9]
    pub license_key: String,
    pub first_name: String,
    pub last_name: String,
    pub account_ids: Vec<String>,
    pub expires_at: i64,
    pub status: LicenseStatus,
    /// Request this license was issued for (None for licenses created directly)
    pub request_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Everything needed to persist a new license except its key.
#[derive(Debug, Clone)]
pub struct IssueLicense {
    pub first_name: String,
    pub last_name: String,
    pub account_ids: Vec<String>,
    pub expires_at: i64,
    pub request_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Admin input for creating a license outside the request workflow.
#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    pub first_name: String,
    pub last_name: String,
    pub account_ids: Vec<String>,
    pub expires_at: i64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl CreateLicense {
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AppError::Validation(
                "first_name and last_name are required".into(),
            ));
        }
        normalize_account_ids(&self.account_ids)?;
        validate_expires_at(self.expires_at)?;
        validate_metadata(self.metadata.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLicense {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub account_ids: Option<Vec<String>>,
    pub status: Option<LicenseStatus>,
    pub expires_at: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl UpdateLicense {
    pub fn validate(&self) -> Result<()> {
        for name in [&self.first_name, &self.last_name].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err(AppError::Validation("names cannot be empty".into()));
            }
        }
        if let Some(ids) = &self.account_ids {
            normalize_account_ids(ids)?;
        }
        if let Some(expires_at) = self.expires_at {
            validate_expires_at(expires_at)?;
        }
        validate_metadata(self.metadata.as_ref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LicenseListQuery {
    pub status: Option<LicenseStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Expiries are positive Unix seconds that map to a calendar date.
pub fn validate_expires_at(expires_at: i64) -> Result<()> {
    if expires_at <= 0 || DateTime::from_timestamp(expires_at, 0).is_none() {
        return Err(AppError::Validation(
            "expires_at must be a positive Unix timestamp in seconds".into(),
        ));
    }
    Ok(())
}

fn validate_metadata(metadata: Option<&serde_json::Value>) -> Result<()> {
    match metadata {
        Some(value) if !value.is_object() => Err(AppError::Validation(
            "metadata must be a JSON object".into(),
        )),
        _ => Ok(()),
    }
}
