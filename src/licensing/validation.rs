use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{License, LicenseStatus, is_valid_account_id};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// What the trading terminal learns about the license covering an account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountValidation {
    pub license_key: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_expired: bool,
    pub status: LicenseStatus,
    pub days_remaining: i64,
    pub account_ids: Vec<String>,
}

impl AccountValidation {
    pub fn from_license(license: License, now: i64) -> Result<Self> {
        let expiry_date = DateTime::from_timestamp(license.expires_at, 0).ok_or_else(|| {
            AppError::Internal(format!(
                "license {} has an unrepresentable expiry {}",
                license.id, license.expires_at
            ))
        })?;
        let is_expired = now > license.expires_at;
        let is_active = !is_expired && license.status == LicenseStatus::Active;
        let full_name = format!("{} {}", license.first_name, license.last_name);
        Ok(Self {
            expiry_date,
            days_remaining: days_remaining(license.expires_at, now),
            license_key: license.license_key,
            first_name: license.first_name,
            last_name: license.last_name,
            full_name,
            is_active,
            is_expired,
            status: license.status,
            account_ids: license.account_ids,
        })
    }
}

/// Whole days left until `expires_at`, rounded up; zero once expired.
pub fn days_remaining(expires_at: i64, now: i64) -> i64 {
    let secs = expires_at.saturating_sub(now);
    if secs <= 0 {
        return 0;
    }
    secs / SECONDS_PER_DAY + i64::from(secs % SECONDS_PER_DAY != 0)
}

/// Look up the license covering `account_id` as of `now`.
///
/// When several licenses list the account, an active unexpired one wins over
/// the rest, and among equals the most recently issued wins.
pub fn validate_account(conn: &Connection, account_id: &str, now: i64) -> Result<AccountValidation> {
    let account_id = account_id.trim();
    if account_id.is_empty() {
        return Err(AppError::Validation("account_id is required".into()));
    }
    if !is_valid_account_id(account_id) {
        return Err(AppError::Validation("account_id must be numeric".into()));
    }

    let license = queries::find_licenses_by_account(conn, account_id, now)?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("No license found for this account_id".into()))?;

    AccountValidation::from_license(license, now)
}
