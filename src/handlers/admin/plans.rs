use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::UserContext;
use crate::models::{AuditAction, CreatePlan, SubscriptionPlan, UpdatePlan};
use crate::util::AuditLogBuilder;

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<CreatePlan>,
) -> Result<(StatusCode, Json<SubscriptionPlan>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let plan = queries::create_plan(&conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::CreatePlan)
        .resource("subscription_plan", &plan.id)
        .details(&json!({
            "name": plan.name,
            "duration_months": plan.duration_months,
            "price": plan.price,
            "currency": plan.currency,
        }))
        .save()?;

    tracing::info!(plan_id = %plan.id, name = %plan.name, "Subscription plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Every plan, including inactive ones.
pub async fn list_all_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_plans(&conn, false)?))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdatePlan>,
) -> Result<Json<SubscriptionPlan>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::update_plan(&conn, &id, &input)? {
        return Err(AppError::NotFound("Subscription plan not found".into()));
    }
    let plan = queries::get_plan_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::UpdatePlan)
        .resource("subscription_plan", &id)
        .details(&json!({
            "name": input.name,
            "duration_months": input.duration_months,
            "price": input.price,
            "is_active": input.is_active,
        }))
        .save()?;

    Ok(Json(plan))
}

/// Requests that referenced the plan keep existing without one.
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::delete_plan(&conn, &id)? {
        return Err(AppError::NotFound("Subscription plan not found".into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DeletePlan)
        .resource("subscription_plan", &id)
        .save()?;

    tracing::info!(plan_id = %id, "Subscription plan deleted");
    Ok(Json(json!({ "deleted": true })))
}
