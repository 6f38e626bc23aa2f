use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, ToSql, types::Type};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::*;

pub const USER_COLS: &str = "id, email, name, role, api_key_hash, created_at";

pub const PLAN_COLS: &str =
    "id, name, duration_months, price, currency, description, is_active, created_at, updated_at";

pub const PAYMENT_METHOD_COLS: &str =
    "id, name, kind, details, instructions, is_active, created_at, updated_at";

pub const LICENSE_REQUEST_COLS: &str = "id, user_id, first_name, last_name, account_ids, reason, subscription_plan_id, payment_id, status, admin_notes, approved_by, approved_at, rejected_by, rejected_at, created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, user_id, license_request_id, subscription_plan_id, payment_method_id, amount, currency, proof, transaction_reference, status, verified_by, verified_at, rejection_reason, created_at, updated_at";

pub const LICENSE_COLS: &str = "id, license_key, first_name, last_name, account_ids, expires_at, status, request_id, metadata, created_at, updated_at";

pub const AUDIT_LOG_COLS: &str =
    "id, timestamp, actor_id, action, resource_type, resource_id, details, ip_address, user_agent";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Read a TEXT column holding a strum-serialized enum.
fn parse_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding serialized JSON.
fn parse_json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: parse_enum(row, 3)?,
            api_key_hash: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for SubscriptionPlan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SubscriptionPlan {
            id: row.get(0)?,
            name: row.get(1)?,
            duration_months: row.get(2)?,
            price: row.get(3)?,
            currency: row.get(4)?,
            description: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl FromRow for PaymentMethod {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentMethod {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: parse_enum(row, 2)?,
            details: parse_json(row, 3)?,
            instructions: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for LicenseRequest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LicenseRequest {
            id: row.get(0)?,
            user_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            account_ids: parse_json(row, 4)?,
            reason: row.get(5)?,
            subscription_plan_id: row.get(6)?,
            payment_id: row.get(7)?,
            status: parse_enum(row, 8)?,
            admin_notes: row.get(9)?,
            approved_by: row.get(10)?,
            approved_at: row.get(11)?,
            rejected_by: row.get(12)?,
            rejected_at: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            license_request_id: row.get(2)?,
            subscription_plan_id: row.get(3)?,
            payment_method_id: row.get(4)?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            proof: row.get(7)?,
            transaction_reference: row.get(8)?,
            status: parse_enum(row, 9)?,
            verified_by: row.get(10)?,
            verified_at: row.get(11)?,
            rejection_reason: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            license_key: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            account_ids: parse_json(row, 4)?,
            expires_at: row.get(5)?,
            status: parse_enum(row, 6)?,
            request_id: row.get(7)?,
            metadata: parse_json(row, 8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(6)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_id: row.get(2)?,
            action: parse_enum(row, 3)?,
            resource_type: row.get(4)?,
            resource_id: row.get(5)?,
            details: details.and_then(|s| serde_json::from_str(&s).ok()),
            ip_address: row.get(7)?,
            user_agent: row.get(8)?,
        })
    }
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<T>> {
    Ok(conn.query_row(sql, params, |row| T::from_row(row)).optional()?)
}

pub fn query_all<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}
