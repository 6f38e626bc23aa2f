use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::UserContext;
use crate::models::{AuditAction, CreatePaymentMethod, PaymentMethod, UpdatePaymentMethod};
use crate::util::AuditLogBuilder;

pub async fn create_payment_method(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<CreatePaymentMethod>,
) -> Result<(StatusCode, Json<PaymentMethod>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let method = queries::create_payment_method(&conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::CreatePaymentMethod)
        .resource("payment_method", &method.id)
        .details(&json!({ "name": method.name, "kind": method.kind }))
        .save()?;

    Ok((StatusCode::CREATED, Json(method)))
}

pub async fn list_all_payment_methods(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentMethod>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_payment_methods(&conn, false)?))
}

pub async fn update_payment_method(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdatePaymentMethod>,
) -> Result<Json<PaymentMethod>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::update_payment_method(&conn, &id, &input)? {
        return Err(AppError::NotFound("Payment method not found".into()));
    }
    let method = queries::get_payment_method_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Payment method not found".into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::UpdatePaymentMethod)
        .resource("payment_method", &id)
        .details(&json!({
            "name": input.name,
            "kind": input.details.as_ref().map(|d| d.kind()),
            "is_active": input.is_active,
        }))
        .save()?;

    Ok(Json(method))
}

pub async fn delete_payment_method(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::delete_payment_method(&conn, &id)? {
        return Err(AppError::NotFound("Payment method not found".into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DeletePaymentMethod)
        .resource("payment_method", &id)
        .save()?;

    Ok(Json(json!({ "deleted": true })))
}
