//! HTTP surface: routing, authentication, status mapping and response shapes.

mod common;
use common::*;

use axum::http::StatusCode;
use licensedesk::licensing::issuance;
use serde_json::{Value, json};

struct Setup {
    db: TestDb,
    user: TestUser,
    admin: TestUser,
}

fn setup() -> Setup {
    let db = TestDb::new();
    let conn = db.conn();
    let user = create_test_user(&conn, "trader@example.com", UserRole::User);
    let admin = create_test_user(&conn, "admin@example.com", UserRole::Admin);
    drop(conn);
    Setup { db, user, admin }
}

fn request_body(account_ids: Value) -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "account_ids": account_ids,
        "reason": "Funded challenge account",
    })
}

fn issue_for(db: &TestDb, account: &str, days: i64) -> License {
    issuance::issue_license(
        &db.conn(),
        &IssueLicense {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            account_ids: vec![account.to_string()],
            expires_at: days_from_now(days),
            request_id: None,
            metadata: json!({}),
        },
    )
    .unwrap()
}

// ============ Public ============

#[tokio::test]
async fn test_health() {
    let s = setup();
    let (status, body) = send(&s.db.app(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ping_and_echo() {
    let s = setup();
    let app = s.db.app();

    let (status, body) = send(&app, "GET", "/mql5/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body.get("receivedData").is_none());

    let (status, body) = send(&app, "POST", "/mql5/ping", None, Some(json!({ "login": 5001 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["receivedData"]["login"], 5001);
}

#[tokio::test]
async fn test_validate_account_string_and_number_forms() {
    let s = setup();
    let license = issue_for(&s.db, "5001", 10);
    let app = s.db.app();

    for body in [json!({ "account_id": "5001" }), json!({ "account_id": 5001 })] {
        let (status, json) = send(&app, "POST", "/mql5/validate-account", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["license"]["licenseKey"], license.license_key.as_str());
        assert_eq!(json["license"]["isActive"], true);
        assert_eq!(json["license"]["daysRemaining"], 10);
    }

    let (status, json) = send(&app, "GET", "/validate-account?account_id=5001", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["fullName"], "Grace Hopper");
}

#[tokio::test]
async fn test_validate_account_error_shapes() {
    let s = setup();
    let app = s.db.app();

    let (status, json) =
        send(&app, "POST", "/validate-account", None, Some(json!({ "account_id": "999" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["isActive"], false);
    assert_eq!(json["error"], "No license found for this account_id");

    let (status, json) = send(&app, "POST", "/validate-account", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = send(&app, "GET", "/validate-account?account_id=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["isActive"], false);
}

#[tokio::test]
async fn test_validate_account_rate_limited_per_account() {
    let db = TestDb::with_rate_limit(1);
    issue_for(&db, "5001", 10);
    let app = db.app();

    let (status, _) = send(&app, "GET", "/validate-account?account_id=5001", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(&app, "GET", "/validate-account?account_id=5001", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["success"], false);

    // Other accounts have their own budget.
    let (status, _) = send(&app, "GET", "/validate-account?account_id=6001", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_account_ids_do_not_consume_limiter_keys() {
    let db = TestDb::with_rate_limit(1);
    let app = db.app();

    for i in 0..20 {
        let uri = format!("/validate-account?account_id=junk-{}", i);
        let (status, json) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "account_id must be numeric");
    }
    // The same malformed id is rejected as invalid, never throttled.
    let (status, _) = send(&app, "GET", "/validate-account?account_id=junk-0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let limiter = db.state.validate_limiter.as_ref().unwrap();
    assert_eq!(limiter.len(), 0);
}

#[tokio::test]
async fn test_public_catalog_hides_inactive_plans() {
    let s = setup();
    let (active, retired) = {
        let conn = s.db.conn();
        let active = create_test_plan(&conn, "Monthly");
        let retired = create_test_plan(&conn, "Lifetime");
        queries::update_plan(
            &conn,
            &retired.id,
            &UpdatePlan {
                name: None,
                duration_months: None,
                price: None,
                currency: None,
                description: None,
                is_active: Some(false),
            },
        )
        .unwrap();
        (active, retired)
    };
    let app = s.db.app();

    let (status, json) = send(&app, "GET", "/plans", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let plans = json.as_array().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["id"], active.id.as_str());

    let (status, _) = send(&app, "GET", &format!("/plans/{}", retired.id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============ Authentication ============

#[tokio::test]
async fn test_missing_or_bad_key_is_unauthorized() {
    let s = setup();
    let app = s.db.app();

    let (status, json) = send(&app, "GET", "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");

    let (status, _) = send(&app, "GET", "/me", Some("ld_not_a_real_key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(&app, "GET", "/me", Some(&s.user.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "trader@example.com");
    assert!(json.get("api_key_hash").is_none());
}

#[tokio::test]
async fn test_admin_routes_refuse_regular_users() {
    let s = setup();
    let app = s.db.app();

    let (status, json) = send(&app, "GET", "/admin/licenses", Some(&s.user.api_key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "forbidden");

    let (status, _) = send(&app, "GET", "/admin/licenses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/admin/licenses", Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
}

// ============ Request workflow over HTTP ============

#[tokio::test]
async fn test_request_approval_flow() {
    let s = setup();
    let app = s.db.app();

    let (status, created) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(request_body(json!(["5001"]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(request_body(json!(["5002"]))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "conflict");

    let decision = json!({ "action": "approve", "expires_at": days_from_now(30) });
    let (status, json) = send(
        &app,
        "PUT",
        &format!("/admin/requests/{}/decision", id),
        Some(&s.admin.api_key),
        Some(decision.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["request"]["status"], "approved");
    assert!(json["license"]["license_key"].is_string());

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/admin/requests/{}/decision", id),
        Some(&s.admin.api_key),
        Some(decision),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_state");

    let (status, json) = send(&app, "POST", "/validate-account", None, Some(json!({ "account_id": 5001 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["license"]["isActive"], true);

    let (status, json) = send(
        &app,
        "DELETE",
        &format!("/admin/requests/{}", id),
        Some(&s.admin.api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_state");

    let (status, json) = send(
        &app,
        "DELETE",
        &format!("/admin/requests/{}?cascade=true", id),
        Some(&s.admin.api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted_licenses"], 1);
}

#[tokio::test]
async fn test_invalid_request_body_is_validation_error() {
    let s = setup();
    let app = s.db.app();

    let (status, json) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(request_body(json!(["12ab"]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "validation_error");

    let (status, json) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(json!({ "first_name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "validation_error");
}

#[tokio::test]
async fn test_unknown_request_is_not_found() {
    let s = setup();
    let (status, json) = send(
        &s.db.app(),
        "GET",
        "/requests/does-not-exist",
        Some(&s.user.api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_users_cannot_read_each_others_requests() {
    let s = setup();
    let other = create_test_user(&s.db.conn(), "other@example.com", UserRole::User);
    let app = s.db.app();

    let (_, created) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(request_body(json!(["5001"]))),
    )
    .await;
    let uri = format!("/requests/{}", created["id"].as_str().unwrap());

    let (status, _) = send(&app, "GET", &uri, Some(&other.api_key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", "/requests", Some(&other.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_admin_actions_are_audited() {
    let s = setup();
    let app = s.db.app();

    let (status, created) = send(
        &app,
        "POST",
        "/admin/users",
        Some(&s.admin.api_key),
        Some(json!({ "email": "new@example.com", "name": "New Trader" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let api_key = created["api_key"].as_str().unwrap().to_string();
    assert_eq!(created["user"]["role"], "user");

    let (status, _) = send(&app, "GET", "/me", Some(&api_key), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", "/admin/audit-logs", Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["actor_id"], s.admin.user.id.as_str());
}

// ============ User management ============

#[tokio::test]
async fn test_admin_lists_users_with_search() {
    let s = setup();
    create_test_user(&s.db.conn(), "grace@example.com", UserRole::User);
    let app = s.db.app();

    let (status, json) = send(&app, "GET", "/admin/users", Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);

    let (status, json) =
        send(&app, "GET", "/admin/users?search=GRACE", Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["email"], "grace@example.com");
    assert!(json["items"][0].get("api_key_hash").is_none());
}

#[tokio::test]
async fn test_admin_updates_user() {
    let s = setup();
    let app = s.db.app();
    let uri = format!("/admin/users/{}", s.user.user.id);

    let (status, json) = send(
        &app,
        "PUT",
        &uri,
        Some(&s.admin.api_key),
        Some(json!({ "name": "Ada L.", "email": "Ada@Example.com", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Ada L.");
    assert_eq!(json["email"], "ada@example.com");
    assert_eq!(json["role"], "admin");

    // The promoted user can now reach admin routes with the same key.
    let (status, _) = send(&app, "GET", "/admin/licenses", Some(&s.user.api_key), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app,
        "PUT",
        &uri,
        Some(&s.admin.api_key),
        Some(json!({ "email": "admin@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "conflict");

    let (status, json) = send(&app, "GET", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "ada@example.com");

    let (status, _) = send(
        &app,
        "PUT",
        "/admin/users/missing",
        Some(&s.admin.api_key),
        Some(json!({ "name": "Nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_cannot_delete_or_demote_self() {
    let s = setup();
    let app = s.db.app();
    let uri = format!("/admin/users/{}", s.admin.user.id);

    let (status, json) = send(&app, "DELETE", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cannot delete your own account");

    let (status, _) =
        send(&app, "PUT", &uri, Some(&s.admin.api_key), Some(json!({ "role": "user" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, "GET", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "admin");
}

#[tokio::test]
async fn test_delete_user_with_history_conflicts() {
    let s = setup();
    let app = s.db.app();

    let (status, created) = send(
        &app,
        "POST",
        "/requests",
        Some(&s.user.api_key),
        Some(request_body(json!(["5001"]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/admin/users/{}", s.user.user.id);
    let (status, json) = send(&app, "DELETE", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "conflict");

    // Nothing was removed.
    let (status, _) = send(&app, "GET", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    let request_uri = format!("/requests/{}", created["id"].as_str().unwrap());
    let (status, _) = send(&app, "GET", &request_uri, Some(&s.user.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_user_without_history() {
    let s = setup();
    let app = s.db.app();
    let uri = format!("/admin/users/{}", s.user.user.id);

    let (status, json) = send(&app, "DELETE", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], true);

    let (status, _) = send(&app, "GET", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/me", Some(&s.user.api_key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "DELETE", &uri, Some(&s.admin.api_key), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(&app, "GET", "/admin/audit-logs", Some(&s.admin.api_key), None).await;
    assert_eq!(json["items"][0]["action"], "delete_user");
    assert_eq!(json["items"][0]["resource_id"], s.user.user.id.as_str());
}

#[tokio::test]
async fn test_create_license_with_unrepresentable_expiry_is_rejected() {
    let s = setup();
    let app = s.db.app();

    for expires_at in [i64::MAX, 0, -86_400] {
        let (status, json) = send(
            &app,
            "POST",
            "/admin/licenses",
            Some(&s.admin.api_key),
            Some(json!({
                "first_name": "Grace",
                "last_name": "Hopper",
                "account_ids": ["5001"],
                "expires_at": expires_at,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} accepted", expires_at);
        assert_eq!(json["code"], "validation_error");
    }

    let (_, json) = send(&app, "GET", "/admin/licenses", Some(&s.admin.api_key), None).await;
    assert_eq!(json["total"], 0);
}
