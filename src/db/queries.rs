use chrono::Utc;
use rusqlite::{Connection, ToSql, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    AUDIT_LOG_COLS, LICENSE_COLS, LICENSE_REQUEST_COLS, PAYMENT_COLS, PAYMENT_METHOD_COLS,
    PLAN_COLS, USER_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Hash an API key for storage/lookup. Plaintext keys are never persisted.
pub fn hash_api_key(api_key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"licensedesk-api-key-v1:");
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate an API key with ld_ prefix
pub fn generate_api_key() -> String {
    format!("ld_{}", Uuid::new_v4().to_string().replace("-", ""))
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Turn a unique-constraint failure into a Conflict with the given message.
fn conflict_on_unique(err: AppError, message: &str) -> AppError {
    match err {
        AppError::Database(ref e) if is_unique_violation(e) => {
            AppError::Conflict(message.to_string())
        }
        other => other,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    /// Returns true if a row was updated. An update with no fields touches
    /// nothing and reports whether the row exists.
    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", self.table);
            let exists: bool = conn.query_row(&sql, params![self.id], |row| row.get(0))?;
            return Ok(exists);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

/// WHERE clause assembled from optional filters, shared by COUNT and SELECT.
struct Filters {
    clause: String,
    values: Vec<Value>,
}

impl Filters {
    fn new() -> Self {
        Self {
            clause: String::from("WHERE 1=1"),
            values: Vec::new(),
        }
    }

    fn eq(mut self, column: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(v) = value {
            self.clause.push_str(&format!(" AND {} = ?", column));
            self.values.push(v.into());
        }
        self
    }

    /// Substring match: each predicate holds one `?` bound to `%term%`,
    /// and a row matches if any predicate does.
    fn search(mut self, predicates: &[&str], term: Option<&str>) -> Self {
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term);
            self.clause
                .push_str(&format!(" AND ({})", predicates.join(" OR ")));
            for _ in predicates {
                self.values.push(pattern.clone().into());
            }
        }
        self
    }

    fn count(&self, conn: &Connection, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} {}", table, self.clause);
        let total = conn.query_row(&sql, rusqlite::params_from_iter(self.values.iter()), |row| {
            row.get(0)
        })?;
        Ok(total)
    }

    fn page<T: super::from_row::FromRow>(
        &self,
        conn: &Connection,
        cols: &str,
        table: &str,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY {} LIMIT ? OFFSET ?",
            cols, table, self.clause, order_by
        );
        let mut values = self.values.clone();
        values.push(limit.into());
        values.push(offset.into());
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        query_all(conn, &sql, &refs)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser, api_key: &str) -> Result<User> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();
    let name = input.name.trim().to_string();
    let role = input.role.unwrap_or(UserRole::User);
    let api_key_hash = hash_api_key(api_key);

    conn.execute(
        "INSERT INTO users (id, email, name, role, api_key_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, &email, &name, role.as_ref(), &api_key_hash, now],
    )
    .map_err(|e| conflict_on_unique(e.into(), "A user with this email already exists"))?;

    Ok(User {
        id,
        email,
        name,
        role,
        api_key_hash,
        created_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn get_user_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<User>> {
    let hash = hash_api_key(api_key);
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE api_key_hash = ?1", USER_COLS),
        &[&hash],
    )
}

pub fn list_users_paginated(
    conn: &Connection,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<User>, i64)> {
    let filters = Filters::new().search(&["email LIKE ?", "name LIKE ?"], search);
    let total = filters.count(conn, "users")?;
    let items = filters.page(
        conn,
        USER_COLS,
        "users",
        "created_at DESC, rowid DESC",
        limit,
        offset,
    )?;
    Ok((items, total))
}

/// Returns false when no user has this id.
pub fn update_user(conn: &Connection, id: &str, input: &UpdateUser) -> Result<bool> {
    UpdateBuilder::new("users", id)
        .set_opt("email", input.email.as_deref().map(|e| e.trim().to_lowercase()))
        .set_opt("name", input.name.as_deref().map(|n| n.trim().to_string()))
        .set_opt("role", input.role.map(|r| r.as_ref().to_string()))
        .execute(conn)
        .map_err(|e| conflict_on_unique(e, "A user with this email already exists"))
}

/// Delete a user who owns no license requests or payments. Those records
/// reference the user, so a user with history is refused with a Conflict.
pub fn delete_user(conn: &Connection, id: &str) -> Result<bool> {
    match conn.execute("DELETE FROM users WHERE id = ?1", params![id]) {
        Ok(deleted) => Ok(deleted > 0),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::Conflict(
            "User still has license requests or payments".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub fn count_admins(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        params![UserRole::Admin.as_ref()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Subscription Plans ============

pub fn create_plan(conn: &Connection, input: &CreatePlan) -> Result<SubscriptionPlan> {
    let id = gen_id();
    let now = now();
    let name = input.name.trim().to_string();
    let currency = input
        .currency
        .as_deref()
        .map(|c| c.trim().to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    conn.execute(
        "INSERT INTO subscription_plans (id, name, duration_months, price, currency, description, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
        params![
            &id,
            &name,
            input.duration_months,
            input.price,
            &currency,
            &input.description,
            now,
            now
        ],
    )
    .map_err(|e| conflict_on_unique(e.into(), "A plan with this name already exists"))?;

    Ok(SubscriptionPlan {
        id,
        name,
        duration_months: input.duration_months,
        price: input.price,
        currency,
        description: input.description.clone(),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_plan_by_id(conn: &Connection, id: &str) -> Result<Option<SubscriptionPlan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscription_plans WHERE id = ?1", PLAN_COLS),
        &[&id],
    )
}

pub fn list_plans(conn: &Connection, active_only: bool) -> Result<Vec<SubscriptionPlan>> {
    let filter = if active_only { "WHERE is_active = 1" } else { "" };
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscription_plans {} ORDER BY duration_months, name",
            PLAN_COLS, filter
        ),
        &[],
    )
}

pub fn update_plan(conn: &Connection, id: &str, input: &UpdatePlan) -> Result<bool> {
    let mut builder = UpdateBuilder::new("subscription_plans", id)
        .with_updated_at()
        .set_opt("name", input.name.as_deref().map(|n| n.trim().to_string()))
        .set_opt("duration_months", input.duration_months)
        .set_opt("price", input.price)
        .set_opt(
            "currency",
            input.currency.as_deref().map(|c| c.trim().to_uppercase()),
        )
        .set_opt("is_active", input.is_active);
    if let Some(description) = &input.description {
        builder = builder.set_nullable("description", description.clone());
    }
    builder
        .execute(conn)
        .map_err(|e| conflict_on_unique(e, "A plan with this name already exists"))
}

pub fn delete_plan(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM subscription_plans WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ Payment Methods ============

pub fn create_payment_method(
    conn: &Connection,
    input: &CreatePaymentMethod,
) -> Result<PaymentMethod> {
    let id = gen_id();
    let now = now();
    let name = input.name.trim().to_string();
    let kind = input.details.kind();
    let details_json = to_json(&input.details)?;

    conn.execute(
        "INSERT INTO payment_methods (id, name, kind, details, instructions, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &name,
            kind.as_ref(),
            &details_json,
            &input.instructions,
            input.is_active,
            now,
            now
        ],
    )?;

    Ok(PaymentMethod {
        id,
        name,
        kind,
        details: input.details.clone(),
        instructions: input.instructions.clone(),
        is_active: input.is_active,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_method_by_id(conn: &Connection, id: &str) -> Result<Option<PaymentMethod>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_methods WHERE id = ?1",
            PAYMENT_METHOD_COLS
        ),
        &[&id],
    )
}

pub fn list_payment_methods(conn: &Connection, active_only: bool) -> Result<Vec<PaymentMethod>> {
    let filter = if active_only { "WHERE is_active = 1" } else { "" };
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_methods {} ORDER BY name",
            PAYMENT_METHOD_COLS, filter
        ),
        &[],
    )
}

pub fn update_payment_method(
    conn: &Connection,
    id: &str,
    input: &UpdatePaymentMethod,
) -> Result<bool> {
    let mut builder = UpdateBuilder::new("payment_methods", id)
        .with_updated_at()
        .set_opt("name", input.name.as_deref().map(|n| n.trim().to_string()))
        .set_opt("instructions", input.instructions.clone())
        .set_opt("is_active", input.is_active);
    if let Some(details) = &input.details {
        builder = builder
            .set("kind", details.kind().as_ref().to_string())
            .set("details", to_json(details)?);
    }
    builder.execute(conn)
}

pub fn delete_payment_method(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM payment_methods WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ License Requests ============

/// Insert a new request. Fails with Conflict if the user already has an open one.
pub fn create_license_request(
    conn: &Connection,
    user_id: &str,
    fields: &RequestFields,
    subscription_plan_id: Option<&str>,
    status: RequestStatus,
) -> Result<LicenseRequest> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO license_requests (id, user_id, first_name, last_name, account_ids, reason, subscription_plan_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            user_id,
            &fields.first_name,
            &fields.last_name,
            to_json(&fields.account_ids)?,
            &fields.reason,
            subscription_plan_id,
            status.as_ref(),
            now,
            now
        ],
    )
    .map_err(|e| conflict_on_unique(e.into(), "You already have an open license request"))?;

    Ok(LicenseRequest {
        id,
        user_id: user_id.to_string(),
        first_name: fields.first_name.clone(),
        last_name: fields.last_name.clone(),
        account_ids: fields.account_ids.clone(),
        reason: fields.reason.clone(),
        subscription_plan_id: subscription_plan_id.map(String::from),
        payment_id: None,
        status,
        admin_notes: None,
        approved_by: None,
        approved_at: None,
        rejected_by: None,
        rejected_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_license_request_by_id(conn: &Connection, id: &str) -> Result<Option<LicenseRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_requests WHERE id = ?1",
            LICENSE_REQUEST_COLS
        ),
        &[&id],
    )
}

pub fn get_open_request_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<LicenseRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM license_requests
             WHERE user_id = ?1 AND status IN ('pending', 'pending_payment', 'payment_verified')",
            LICENSE_REQUEST_COLS
        ),
        &[&user_id],
    )
}

#[derive(Debug, Default)]
pub struct RequestFilter<'a> {
    pub user_id: Option<&'a str>,
    pub status: Option<RequestStatus>,
    pub search: Option<&'a str>,
}

/// Newest first, with rowid breaking ties inside the same second.
pub fn list_license_requests_paginated(
    conn: &Connection,
    filter: &RequestFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<LicenseRequest>, i64)> {
    let filters = Filters::new()
        .eq("user_id", filter.user_id.map(String::from))
        .eq("status", filter.status.map(|s| s.as_ref().to_string()))
        .search(
            &[
                "first_name LIKE ?",
                "last_name LIKE ?",
                "account_ids LIKE ?",
                "user_id IN (SELECT id FROM users WHERE email LIKE ?)",
                "user_id IN (SELECT id FROM users WHERE name LIKE ?)",
            ],
            filter.search,
        );
    let total = filters.count(conn, "license_requests")?;
    let items = filters.page(
        conn,
        LICENSE_REQUEST_COLS,
        "license_requests",
        "created_at DESC, rowid DESC",
        limit,
        offset,
    )?;
    Ok((items, total))
}

/// Overwrite the user-editable fields, only while the request is still pending.
pub fn update_pending_request_fields(
    conn: &Connection,
    id: &str,
    fields: &RequestFields,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE license_requests
         SET first_name = ?1, last_name = ?2, account_ids = ?3, reason = ?4, updated_at = ?5
         WHERE id = ?6 AND status = 'pending'",
        params![
            &fields.first_name,
            &fields.last_name,
            to_json(&fields.account_ids)?,
            &fields.reason,
            now(),
            id
        ],
    )?;
    Ok(updated > 0)
}

/// Compare-and-set a status change between two open statuses.
pub fn set_request_status(
    conn: &Connection,
    id: &str,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE license_requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_ref(), now(), id, from.as_ref()],
    )?;
    Ok(updated > 0)
}

/// Compare-and-set a request into `approved`, stamping the approver.
pub fn approve_request(
    conn: &Connection,
    id: &str,
    from: RequestStatus,
    admin_id: &str,
    admin_notes: Option<&str>,
) -> Result<bool> {
    let now = now();
    let updated = conn.execute(
        "UPDATE license_requests
         SET status = 'approved', approved_by = ?1, approved_at = ?2,
             rejected_by = NULL, rejected_at = NULL,
             admin_notes = COALESCE(?3, admin_notes), updated_at = ?2
         WHERE id = ?4 AND status = ?5",
        params![admin_id, now, admin_notes, id, from.as_ref()],
    )?;
    Ok(updated > 0)
}

/// Compare-and-set a request into `rejected`. `admin_id` is None when the
/// rejection follows from a failed payment rather than a direct decision.
pub fn reject_request(
    conn: &Connection,
    id: &str,
    from: RequestStatus,
    admin_id: Option<&str>,
    admin_notes: Option<&str>,
) -> Result<bool> {
    let now = now();
    let updated = conn.execute(
        "UPDATE license_requests
         SET status = 'rejected', rejected_by = ?1, rejected_at = ?2,
             approved_by = NULL, approved_at = NULL,
             admin_notes = COALESCE(?3, admin_notes), updated_at = ?2
         WHERE id = ?4 AND status = ?5",
        params![admin_id, now, admin_notes, id, from.as_ref()],
    )?;
    Ok(updated > 0)
}

/// Link a submitted payment to its request and move the request to
/// `pending_payment`. The plan is only filled in if the request had none.
pub fn attach_payment_to_request(
    conn: &Connection,
    request_id: &str,
    payment_id: &str,
    subscription_plan_id: &str,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE license_requests
         SET payment_id = ?1, subscription_plan_id = COALESCE(subscription_plan_id, ?2),
             status = 'pending_payment', updated_at = ?3
         WHERE id = ?4 AND status IN ('pending', 'pending_payment', 'payment_verified')",
        params![payment_id, subscription_plan_id, now(), request_id],
    )?;
    Ok(updated > 0)
}

pub fn delete_license_request(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM license_requests WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ============ Payments ============

pub fn create_payment(conn: &Connection, user_id: &str, input: &SubmitPayment) -> Result<Payment> {
    let id = gen_id();
    let now = now();
    let currency = input.currency_code();
    let proof = input.proof.trim().to_string();
    let status = PaymentStatus::Pending;

    conn.execute(
        "INSERT INTO payments (id, user_id, license_request_id, subscription_plan_id, payment_method_id, amount, currency, proof, transaction_reference, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &id,
            user_id,
            &input.license_request_id,
            &input.subscription_plan_id,
            &input.payment_method_id,
            input.amount,
            &currency,
            &proof,
            &input.transaction_reference,
            status.as_ref(),
            now,
            now
        ],
    )?;

    Ok(Payment {
        id,
        user_id: user_id.to_string(),
        license_request_id: Some(input.license_request_id.clone()),
        subscription_plan_id: input.subscription_plan_id.clone(),
        payment_method_id: input.payment_method_id.clone(),
        amount: input.amount,
        currency,
        proof,
        transaction_reference: input.transaction_reference.clone(),
        status,
        verified_by: None,
        verified_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_by_id(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn list_payments_paginated(
    conn: &Connection,
    user_id: Option<&str>,
    status: Option<PaymentStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Payment>, i64)> {
    let filters = Filters::new()
        .eq("user_id", user_id.map(String::from))
        .eq("status", status.map(|s| s.as_ref().to_string()));
    let total = filters.count(conn, "payments")?;
    let items = filters.page(
        conn,
        PAYMENT_COLS,
        "payments",
        "created_at DESC, rowid DESC",
        limit,
        offset,
    )?;
    Ok((items, total))
}

/// Compare-and-set a payment into `verified`.
pub fn verify_payment(
    conn: &Connection,
    id: &str,
    from: PaymentStatus,
    admin_id: &str,
) -> Result<bool> {
    let now = now();
    let updated = conn.execute(
        "UPDATE payments SET status = 'verified', verified_by = ?1, verified_at = ?2, updated_at = ?2
         WHERE id = ?3 AND status = ?4",
        params![admin_id, now, id, from.as_ref()],
    )?;
    Ok(updated > 0)
}

/// Compare-and-set a pending payment into `rejected`.
pub fn reject_payment(conn: &Connection, id: &str, reason: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payments SET status = 'rejected', rejection_reason = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![reason, now(), id],
    )?;
    Ok(updated > 0)
}

// ============ Licenses ============

/// Insert a license under the given key. A key collision surfaces as a
/// unique-constraint database error for the caller to retry on.
pub fn create_license(conn: &Connection, license_key: &str, input: &IssueLicense) -> Result<License> {
    let id = gen_id();
    let now = now();
    let status = LicenseStatus::Active;

    conn.execute(
        "INSERT INTO licenses (id, license_key, first_name, last_name, account_ids, expires_at, status, request_id, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &id,
            license_key,
            &input.first_name,
            &input.last_name,
            to_json(&input.account_ids)?,
            input.expires_at,
            status.as_ref(),
            &input.request_id,
            to_json(&input.metadata)?,
            now,
            now
        ],
    )?;

    Ok(License {
        id,
        license_key: license_key.to_string(),
        first_name: input.first_name.clone(),
        last_name: input.last_name.clone(),
        account_ids: input.account_ids.clone(),
        expires_at: input.expires_at,
        status,
        request_id: input.request_id.clone(),
        metadata: input.metadata.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

pub fn list_licenses_paginated(
    conn: &Connection,
    status: Option<LicenseStatus>,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<License>, i64)> {
    let filters = Filters::new()
        .eq("status", status.map(|s| s.as_ref().to_string()))
        .search(
            &[
                "license_key LIKE ?",
                "first_name LIKE ?",
                "last_name LIKE ?",
                "account_ids LIKE ?",
            ],
            search,
        );
    let total = filters.count(conn, "licenses")?;
    let items = filters.page(
        conn,
        LICENSE_COLS,
        "licenses",
        "created_at DESC, rowid DESC",
        limit,
        offset,
    )?;
    Ok((items, total))
}

pub fn list_licenses_for_request(conn: &Connection, request_id: &str) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE request_id = ?1 ORDER BY created_at, rowid",
            LICENSE_COLS
        ),
        &[&request_id],
    )
}

/// All licenses listing `account_id`, best candidate first: active and
/// unexpired at `now`, then newest.
pub fn find_licenses_by_account(
    conn: &Connection,
    account_id: &str,
    now: i64,
) -> Result<Vec<License>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses
             WHERE EXISTS (SELECT 1 FROM json_each(licenses.account_ids) WHERE json_each.value = ?1)
             ORDER BY (status = 'active' AND expires_at >= ?2) DESC, created_at DESC, rowid DESC",
            LICENSE_COLS
        ),
        params![account_id, now],
    )
}

pub fn update_license(conn: &Connection, id: &str, input: &UpdateLicense) -> Result<bool> {
    let account_ids = match &input.account_ids {
        Some(ids) => Some(to_json(&normalize_account_ids(ids)?)?),
        None => None,
    };
    let metadata = match &input.metadata {
        Some(m) => Some(to_json(m)?),
        None => None,
    };
    UpdateBuilder::new("licenses", id)
        .with_updated_at()
        .set_opt(
            "first_name",
            input.first_name.as_deref().map(|n| n.trim().to_string()),
        )
        .set_opt(
            "last_name",
            input.last_name.as_deref().map(|n| n.trim().to_string()),
        )
        .set_opt("account_ids", account_ids)
        .set_opt("status", input.status.map(|s| s.as_ref().to_string()))
        .set_opt("expires_at", input.expires_at)
        .set_opt("metadata", metadata)
        .execute(conn)
}

pub fn delete_license(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM licenses WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn delete_licenses_for_request(conn: &Connection, request_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM licenses WHERE request_id = ?1",
        params![request_id],
    )?;
    Ok(deleted)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_id: Option<&str>,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let log = AuditLog {
        id: gen_id(),
        timestamp: now(),
        actor_id: actor_id.map(String::from),
        action,
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    let details_str = details.map(|d| d.to_string());
    conn.execute(
        &format!(
            "INSERT INTO audit_logs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            AUDIT_LOG_COLS
        ),
        params![
            &log.id,
            log.timestamp,
            actor_id,
            action.as_ref(),
            resource_type,
            resource_id,
            &details_str,
            ip_address,
            user_agent
        ],
    )?;

    Ok(log)
}

pub fn query_audit_logs(
    conn: &Connection,
    query: &AuditLogQuery,
) -> Result<(Vec<AuditLog>, i64)> {
    let filters = Filters::new()
        .eq("actor_id", query.actor_id.clone())
        .eq("action", query.action.map(|a| a.as_ref().to_string()))
        .eq("resource_type", query.resource_type.clone())
        .eq("resource_id", query.resource_id.clone());
    let total = filters.count(conn, "audit_logs")?;
    let logs = filters.page(
        conn,
        AUDIT_LOG_COLS,
        "audit_logs",
        "timestamp DESC, rowid DESC",
        query.limit(),
        query.offset(),
    )?;
    Ok((logs, total))
}

/// Delete audit logs older than `retention_days`. Zero keeps everything.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let cutoff = now() - retention_days * 86400;
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
