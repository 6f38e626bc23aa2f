use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Serialize;
use serde_json::json;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::licensing::requests;
use crate::middleware::UserContext;
use crate::models::{AuditAction, DecideRequest, DeleteRequestQuery, RequestDecision};
use crate::util::AuditLogBuilder;

/// PUT /admin/requests/{id}/decision
pub async fn decide_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<DecideRequest>,
) -> Result<Json<RequestDecision>> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let decision = requests::decide_request(&mut conn, &ctx.user.id, &id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DecideRequest)
        .resource("license_request", &id)
        .details(&json!({
            "action": input.action,
            "admin_notes": input.admin_notes,
            "expires_at": input.expires_at,
            "license_id": decision.license.as_ref().map(|l| &l.id),
        }))
        .save()?;

    Ok(Json(decision))
}

#[derive(Debug, Serialize)]
pub struct DeleteRequestResponse {
    pub deleted: bool,
    pub deleted_licenses: usize,
}

/// DELETE /admin/requests/{id}?cascade=true
pub async fn delete_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    Query(query): Query<DeleteRequestQuery>,
    headers: HeaderMap,
) -> Result<Json<DeleteRequestResponse>> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let deleted_licenses = requests::delete_request(&mut conn, &ctx.user.id, &id, query.cascade)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DeleteRequest)
        .resource("license_request", &id)
        .details(&json!({
            "cascade": query.cascade,
            "deleted_licenses": deleted_licenses,
        }))
        .save()?;

    Ok(Json(DeleteRequestResponse {
        deleted: true,
        deleted_licenses,
    }))
}
