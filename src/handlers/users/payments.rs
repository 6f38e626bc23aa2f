use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::licensing::payments;
use crate::middleware::UserContext;
use crate::models::{AuditAction, Payment, PaymentListQuery, SubmitPayment};
use crate::pagination::Paginated;
use crate::util::AuditLogBuilder;

/// POST /payments
pub async fn submit_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<SubmitPayment>,
) -> Result<(StatusCode, Json<Payment>)> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let payment = payments::submit_payment(&mut conn, &ctx.user.id, &input)?;

    // Proof can be a large data URI, so it stays out of the audit trail
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::SubmitPayment)
        .resource("payment", &payment.id)
        .details(&json!({
            "license_request_id": payment.license_request_id,
            "payment_method_id": payment.payment_method_id,
            "amount": payment.amount,
            "currency": payment.currency,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /payments
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<Paginated<Payment>>> {
    let conn = state.db.get()?;
    Ok(Json(payments::list_payments(&conn, &ctx.user, &query)?))
}

/// GET /payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<Payment>> {
    let conn = state.db.get()?;
    Ok(Json(payments::get_payment(&conn, &ctx.user, &id)?))
}
