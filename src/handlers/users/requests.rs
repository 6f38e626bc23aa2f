use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path, Query};
use crate::licensing::requests;
use crate::middleware::UserContext;
use crate::models::{
    AuditAction, CreateLicenseRequest, LicenseRequest, RequestFields, RequestListQuery,
};
use crate::pagination::Paginated;
use crate::util::AuditLogBuilder;

/// POST /requests
pub async fn create_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<CreateLicenseRequest>,
) -> Result<(StatusCode, Json<LicenseRequest>)> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let request = requests::create_request(&mut conn, &ctx.user.id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::CreateRequest)
        .resource("license_request", &request.id)
        .details(&json!({
            "account_ids": request.account_ids,
            "subscription_plan_id": request.subscription_plan_id,
            "status": request.status,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// PATCH /requests/{id}
pub async fn edit_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<RequestFields>,
) -> Result<Json<LicenseRequest>> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let request = requests::edit_request(&mut conn, &ctx.user.id, &id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::EditRequest)
        .resource("license_request", &request.id)
        .details(&json!({ "account_ids": request.account_ids }))
        .save()?;

    Ok(Json(request))
}

/// GET /requests
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Paginated<LicenseRequest>>> {
    let conn = state.db.get()?;
    Ok(Json(requests::list_requests(&conn, &ctx.user, &query)?))
}

/// GET /requests/{id}
pub async fn get_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<LicenseRequest>> {
    let conn = state.db.get()?;
    Ok(Json(requests::get_request(&conn, &ctx.user, &id)?))
}
