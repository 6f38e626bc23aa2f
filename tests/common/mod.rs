//! Shared fixtures for integration tests.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub use licensedesk::db::{AppState, queries};
pub use licensedesk::error::AppError;
pub use licensedesk::models::*;
use licensedesk::rate_limit;

/// File-backed pools in a temp dir. Keep the struct alive for the whole test.
pub struct TestDb {
    pub state: AppState,
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_rate_limit(0)
    }

    pub fn with_rate_limit(per_minute: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("licensedesk.db");
        let audit_path = dir.path().join("audit.db");

        let db = licensedesk::db::create_pool(db_path.to_str().unwrap()).unwrap();
        licensedesk::db::init_db(&db.get().unwrap()).unwrap();
        let audit = licensedesk::db::create_pool(audit_path.to_str().unwrap()).unwrap();
        licensedesk::db::init_audit_db(&audit.get().unwrap()).unwrap();

        let state = AppState {
            db,
            audit,
            audit_log_enabled: true,
            validate_limiter: rate_limit::account_limiter(per_minute),
        };
        Self { state, _dir: dir }
    }

    pub fn conn(&self) -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        self.state.db.get().unwrap()
    }

    pub fn app(&self) -> Router {
        licensedesk::handlers::build_router(self.state.clone())
    }
}

/// A user plus the plaintext API key they authenticate with.
pub struct TestUser {
    pub user: User,
    pub api_key: String,
}

pub fn create_test_user(conn: &rusqlite::Connection, email: &str, role: UserRole) -> TestUser {
    let api_key = queries::generate_api_key();
    let input = CreateUser {
        email: email.to_string(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role: Some(role),
    };
    let user = queries::create_user(conn, &input, &api_key).unwrap();
    TestUser { user, api_key }
}

pub fn create_test_plan(conn: &rusqlite::Connection, name: &str) -> SubscriptionPlan {
    let input = CreatePlan {
        name: name.to_string(),
        duration_months: 1,
        price: 49.0,
        currency: None,
        description: None,
    };
    queries::create_plan(conn, &input).unwrap()
}

pub fn create_test_method(conn: &rusqlite::Connection) -> PaymentMethod {
    let input = CreatePaymentMethod {
        name: "PayPal".to_string(),
        details: PaymentDetails::Paypal {
            email: "pay@example.com".to_string(),
        },
        instructions: "Send as friends and family".to_string(),
        is_active: true,
    };
    queries::create_payment_method(conn, &input).unwrap()
}

pub fn request_fields(account_ids: &[&str]) -> RequestFields {
    RequestFields {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        account_ids: account_ids.iter().map(|s| s.to_string()).collect(),
        reason: "Funded challenge account".to_string(),
    }
}

pub fn new_request(account_ids: &[&str], plan_id: Option<&str>) -> CreateLicenseRequest {
    CreateLicenseRequest {
        fields: request_fields(account_ids),
        subscription_plan_id: plan_id.map(String::from),
    }
}

pub fn payment_for(request: &LicenseRequest, plan_id: &str, method_id: &str) -> SubmitPayment {
    SubmitPayment {
        license_request_id: request.id.clone(),
        subscription_plan_id: plan_id.to_string(),
        payment_method_id: method_id.to_string(),
        amount: 49.0,
        currency: None,
        proof: "https://files.example.com/receipt.png".to_string(),
        transaction_reference: Some("TX-1001".to_string()),
    }
}

/// Send a request through the router and decode the JSON body (Null when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Seconds since the epoch, `days` from now.
pub fn days_from_now(days: i64) -> i64 {
    chrono::Utc::now().timestamp() + days * 86_400
}
