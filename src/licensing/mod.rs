//! The licensing core: the request lifecycle, payment linkage, license
//! issuance and the account validation query.
//!
//! Every mutating operation runs in an IMMEDIATE transaction and moves
//! statuses with compare-and-set updates, so concurrent decisions on the same
//! record cannot both succeed.

pub mod issuance;
pub mod payments;
pub mod requests;
pub mod validation;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::User;

fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn load_user(conn: &Connection, user_id: &str) -> Result<User> {
    queries::get_user_by_id(conn, user_id)?.ok_or(AppError::Unauthorized)
}

fn require_admin(conn: &Connection, user_id: &str) -> Result<User> {
    let user = load_user(conn, user_id)?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    Ok(user)
}

/// A compare-and-set update matched no row: someone else changed it first.
fn concurrent_change(what: &str) -> AppError {
    AppError::InvalidState(format!("{} was modified concurrently, reload and retry", what))
}

/// Trimmed text, or None when absent or blank.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
