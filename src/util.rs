//! Shared helpers for request handling and audit logging.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::AuditAction;

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Fluent writer for one audit log entry.
///
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .actor(Some(&ctx.user.id))
///     .action(AuditAction::CreatePlan)
///     .resource("subscription_plan", &plan.id)
///     .details(&json!({ "name": plan.name }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    actor_id: Option<&'a str>,
    action: Option<AuditAction>,
    resource_type: &'a str,
    resource_id: &'a str,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            conn,
            enabled,
            headers,
            actor_id: None,
            action: None,
            resource_type: "",
            resource_id: "",
            details: None,
        }
    }

    pub fn actor(mut self, actor_id: Option<&'a str>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn save(self) -> Result<()> {
        let Some(action) = self.action else {
            tracing::warn!(resource_id = self.resource_id, "Audit entry without action dropped");
            return Ok(());
        };
        let (ip, user_agent) = extract_request_info(self.headers);
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_id,
            action,
            self.resource_type,
            self.resource_id,
            self.details,
            ip.as_deref(),
            user_agent.as_deref(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_prefix_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer ld_abc"));
        assert_eq!(extract_bearer_token(&headers), Some("ld_abc"));
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("MetaTrader 5"));
        let (ip, ua) = extract_request_info(&headers);
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ua.as_deref(), Some("MetaTrader 5"));
    }
}
