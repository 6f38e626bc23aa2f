mod from_row;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;
use crate::rate_limit::AccountRateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub audit: DbPool,
    pub audit_log_enabled: bool,
    /// Per-account throttle for the public validation endpoint (None = unlimited)
    pub validate_limiter: Option<Arc<AccountRateLimiter>>,
}

/// Open a pooled SQLite database. Every pooled connection enforces foreign keys
/// and waits on a locked database instead of failing immediately.
pub fn create_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))
    });
    let pool = Pool::builder().max_size(10).build(manager)?;
    Ok(pool)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'admin')),
            api_key_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscription_plans (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            duration_months INTEGER NOT NULL CHECK (duration_months > 0),
            price REAL NOT NULL CHECK (price >= 0),
            currency TEXT NOT NULL,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payment_methods (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            details TEXT NOT NULL,
            instructions TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS license_requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            account_ids TEXT NOT NULL,
            reason TEXT NOT NULL,
            subscription_plan_id TEXT REFERENCES subscription_plans(id) ON DELETE SET NULL,
            payment_id TEXT,
            status TEXT NOT NULL CHECK (status IN
                ('pending', 'pending_payment', 'payment_verified', 'approved', 'rejected')),
            admin_notes TEXT,
            approved_by TEXT,
            approved_at INTEGER,
            rejected_by TEXT,
            rejected_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (approved_by IS NULL OR rejected_by IS NULL)
        );
        -- At most one open request per user
        CREATE UNIQUE INDEX IF NOT EXISTS idx_license_requests_open_per_user
            ON license_requests(user_id)
            WHERE status IN ('pending', 'pending_payment', 'payment_verified');
        CREATE INDEX IF NOT EXISTS idx_license_requests_status
            ON license_requests(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_license_requests_user
            ON license_requests(user_id, created_at);

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            license_request_id TEXT REFERENCES license_requests(id) ON DELETE SET NULL,
            subscription_plan_id TEXT NOT NULL,
            payment_method_id TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount > 0),
            currency TEXT NOT NULL,
            proof TEXT NOT NULL,
            transaction_reference TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'verified', 'rejected')),
            verified_by TEXT,
            verified_at INTEGER,
            rejection_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_request ON payments(license_request_id);
        CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status, created_at);

        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            account_ids TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'inactive', 'expired')),
            request_id TEXT REFERENCES license_requests(id) ON DELETE SET NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_request ON licenses(request_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status, expires_at);
        "#,
    )?;
    Ok(())
}

/// Audit logs live in their own database so they can be retained and purged
/// independently of the licensing data.
pub fn init_audit_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_actor ON audit_logs(actor_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource
            ON audit_logs(resource_type, resource_id);
        "#,
    )?;
    Ok(())
}
