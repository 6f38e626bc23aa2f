//! Account validation against issued licenses.

mod common;
use common::*;

use licensedesk::licensing::{issuance, validation};
use serde_json::json;

const NOW: i64 = 1_750_000_000;
const DAY: i64 = 86_400;

fn issue(conn: &rusqlite::Connection, accounts: &[&str], expires_at: i64) -> License {
    issuance::issue_license(
        conn,
        &IssueLicense {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            account_ids: accounts.iter().map(|s| s.to_string()).collect(),
            expires_at,
            request_id: None,
            metadata: json!({ "source": "admin" }),
        },
    )
    .unwrap()
}

fn set_status(conn: &rusqlite::Connection, license: &License, status: LicenseStatus) {
    queries::update_license(
        conn,
        &license.id,
        &UpdateLicense {
            first_name: None,
            last_name: None,
            account_ids: None,
            status: Some(status),
            expires_at: None,
            metadata: None,
        },
    )
    .unwrap();
}

#[test]
fn test_active_license_ten_days_out() {
    let db = TestDb::new();
    let conn = db.conn();
    let license = issue(&conn, &["5001", "5002"], NOW + 10 * DAY);

    let result = validation::validate_account(&conn, "5002", NOW).unwrap();

    assert_eq!(result.license_key, license.license_key);
    assert!(result.is_active);
    assert!(!result.is_expired);
    assert_eq!(result.days_remaining, 10);
    assert_eq!(result.full_name, "Grace Hopper");
    assert_eq!(result.account_ids, vec!["5001", "5002"]);
    assert_eq!(result.expiry_date.timestamp(), NOW + 10 * DAY);
}

#[test]
fn test_partial_day_rounds_up() {
    let db = TestDb::new();
    let conn = db.conn();
    issue(&conn, &["5001"], NOW + 2 * DAY + 60);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert_eq!(result.days_remaining, 3);
}

#[test]
fn test_expired_license_is_inactive() {
    let db = TestDb::new();
    let conn = db.conn();
    issue(&conn, &["5001"], NOW - DAY);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert!(!result.is_active);
    assert!(result.is_expired);
    assert_eq!(result.days_remaining, 0);
    assert_eq!(result.status, LicenseStatus::Active);
}

#[test]
fn test_deactivated_license_is_inactive_but_not_expired() {
    let db = TestDb::new();
    let conn = db.conn();
    let license = issue(&conn, &["5001"], NOW + 10 * DAY);
    set_status(&conn, &license, LicenseStatus::Inactive);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert!(!result.is_active);
    assert!(!result.is_expired);
    assert_eq!(result.status, LicenseStatus::Inactive);
}

#[test]
fn test_active_license_wins_over_newer_inactive_one() {
    let db = TestDb::new();
    let conn = db.conn();
    let active = issue(&conn, &["5001"], NOW + 30 * DAY);
    let deactivated = issue(&conn, &["5001"], NOW + 90 * DAY);
    set_status(&conn, &deactivated, LicenseStatus::Inactive);
    issue(&conn, &["5001"], NOW - DAY);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert_eq!(result.license_key, active.license_key);
    assert!(result.is_active);
}

#[test]
fn test_newest_wins_among_active_licenses() {
    let db = TestDb::new();
    let conn = db.conn();
    issue(&conn, &["5001"], NOW + 30 * DAY);
    let newer = issue(&conn, &["5001"], NOW + 10 * DAY);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert_eq!(result.license_key, newer.license_key);
}

#[test]
fn test_account_id_matches_whole_ids_only() {
    let db = TestDb::new();
    let conn = db.conn();
    issue(&conn, &["50011"], NOW + 10 * DAY);

    let err = validation::validate_account(&conn, "5001", NOW).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.to_string(), "No license found for this account_id");
}

#[test]
fn test_malformed_account_id() {
    let db = TestDb::new();
    let conn = db.conn();

    assert!(matches!(
        validation::validate_account(&conn, "   ", NOW),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        validation::validate_account(&conn, "12ab", NOW),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn test_validation_is_read_only() {
    let db = TestDb::new();
    let conn = db.conn();
    let license = issue(&conn, &["5001"], NOW + 10 * DAY);

    validation::validate_account(&conn, "5001", NOW).unwrap();

    let stored = queries::get_license_by_id(&conn, &license.id).unwrap().unwrap();
    assert_eq!(stored.updated_at, license.updated_at);
    assert_eq!(stored.status, license.status);
}

#[test]
fn test_license_expiring_this_second_still_outranks_expired_ones() {
    let db = TestDb::new();
    let conn = db.conn();
    let boundary = issue(&conn, &["5001"], NOW);
    issue(&conn, &["5001"], NOW - DAY);

    let result = validation::validate_account(&conn, "5001", NOW).unwrap();
    assert_eq!(result.license_key, boundary.license_key);
    assert!(result.is_active);
    assert!(!result.is_expired);
    assert_eq!(result.days_remaining, 0);
}
