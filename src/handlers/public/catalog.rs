use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{PaymentMethod, SubscriptionPlan};

/// Active plans, shortest first.
pub async fn list_active_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriptionPlan>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_plans(&conn, true)?))
}

pub async fn get_active_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionPlan>> {
    let conn = state.db.get()?;
    let plan = queries::get_plan_by_id(&conn, &id)?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("Subscription plan not found".into()))?;
    Ok(Json(plan))
}

pub async fn list_active_payment_methods(
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentMethod>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_payment_methods(&conn, true)?))
}
