use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde_json::json;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::licensing::payments;
use crate::middleware::UserContext;
use crate::models::{AuditAction, DecidePayment, PaymentDecision};
use crate::util::AuditLogBuilder;

/// PUT /admin/payments/{id}/decision
pub async fn decide_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<DecidePayment>,
) -> Result<Json<PaymentDecision>> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let decision = payments::decide_payment(&mut conn, &ctx.user.id, &id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DecidePayment)
        .resource("payment", &id)
        .details(&json!({
            "action": input.action,
            "expires_at": input.expires_at,
            "reason": decision.payment.rejection_reason,
            "request_status": decision.request.as_ref().map(|r| r.status),
            "license_id": decision.license.as_ref().map(|l| &l.id),
        }))
        .save()?;

    Ok(Json(decision))
}
