use rand::Rng;
use rusqlite::Connection;
use serde_json::json;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{IssueLicense, License, LicenseRequest, validate_expires_at};

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;
const MAX_KEY_ATTEMPTS: u32 = 5;

/// Random key of the form XXXX-XXXX-XXXX-XXXX over [A-Z0-9].
pub fn generate_license_key() -> String {
    let mut rng = rand::thread_rng();
    let groups: Vec<String> = (0..KEY_GROUPS)
        .map(|_| {
            (0..KEY_GROUP_LEN)
                .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
                .collect()
        })
        .collect();
    groups.join("-")
}

pub fn is_valid_license_key(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == KEY_GROUPS
        && groups.iter().all(|g| {
            g.len() == KEY_GROUP_LEN
                && g.bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}

/// License input for a request being approved, exempted or paid.
pub fn license_for_request(
    request: &LicenseRequest,
    expires_at: i64,
    approved_by: &str,
    source: &str,
) -> IssueLicense {
    IssueLicense {
        first_name: request.first_name.clone(),
        last_name: request.last_name.clone(),
        account_ids: request.account_ids.clone(),
        expires_at,
        request_id: Some(request.id.clone()),
        metadata: json!({
            "request_id": request.id,
            "approved_by": approved_by,
            "source": source,
        }),
    }
}

/// Persist an active license under a freshly generated key.
pub fn issue_license(conn: &Connection, input: &IssueLicense) -> Result<License> {
    issue_license_with(conn, input, generate_license_key)
}

/// Like [`issue_license`], drawing keys from `keygen` and regenerating on a
/// key collision up to a fixed number of attempts.
pub fn issue_license_with(
    conn: &Connection,
    input: &IssueLicense,
    mut keygen: impl FnMut() -> String,
) -> Result<License> {
    validate_expires_at(input.expires_at)?;
    for attempt in 1..=MAX_KEY_ATTEMPTS {
        let key = keygen();
        match queries::create_license(conn, &key, input) {
            Ok(license) => {
                tracing::info!(
                    license_id = %license.id,
                    request_id = ?license.request_id,
                    expires_at = license.expires_at,
                    "License issued"
                );
                return Ok(license);
            }
            Err(AppError::Database(ref e)) if queries::is_unique_violation(e) => {
                tracing::warn!(attempt, "License key collision, regenerating");
            }
            Err(e) => return Err(e),
        }
    }
    Err(AppError::Internal(format!(
        "no unique license key after {} attempts",
        MAX_KEY_ATTEMPTS
    )))
}
