use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing::issuance;
use crate::middleware::UserContext;
use crate::models::{
    AuditAction, CreateLicense, IssueLicense, License, LicenseListQuery, UpdateLicense,
    normalize_account_ids,
};
use crate::pagination::{Paginated, clamp_limit, clamp_offset};
use crate::util::AuditLogBuilder;

/// POST /admin/licenses
/// Issue a license outside the request workflow (migrations, goodwill, support).
pub async fn create_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<CreateLicense>,
) -> Result<(StatusCode, Json<License>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let mut metadata = input.metadata.clone().unwrap_or_else(|| json!({}));
    if let Some(fields) = metadata.as_object_mut() {
        fields.entry("source").or_insert_with(|| json!("admin"));
        fields
            .entry("created_by")
            .or_insert_with(|| json!(ctx.user.id));
    }

    let license = issuance::issue_license(
        &conn,
        &IssueLicense {
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            account_ids: normalize_account_ids(&input.account_ids)?,
            expires_at: input.expires_at,
            request_id: None,
            metadata,
        },
    )?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::CreateLicense)
        .resource("license", &license.id)
        .details(&json!({
            "account_ids": license.account_ids,
            "expires_at": license.expires_at,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(license)))
}

/// GET /admin/licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Query(query): Query<LicenseListQuery>,
) -> Result<Json<Paginated<License>>> {
    let conn = state.db.get()?;
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let (items, total) = queries::list_licenses_paginated(
        &conn,
        query.status,
        query.search.as_deref(),
        limit,
        offset,
    )?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// GET /admin/licenses/{id}
pub async fn get_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<License>> {
    let conn = state.db.get()?;
    let license = queries::get_license_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(license))
}

/// PUT /admin/licenses/{id}
pub async fn update_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateLicense>,
) -> Result<Json<License>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::update_license(&conn, &id, &input)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    let license = queries::get_license_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::UpdateLicense)
        .resource("license", &id)
        .details(&json!({
            "status": input.status,
            "expires_at": input.expires_at,
            "account_ids": input.account_ids.as_ref().map(|_| &license.account_ids),
        }))
        .save()?;

    tracing::info!(license_id = %id, admin_id = %ctx.user.id, "License updated");
    Ok(Json(license))
}

/// DELETE /admin/licenses/{id}
pub async fn delete_license(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let license = queries::get_license_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    queries::delete_license(&conn, &id)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DeleteLicense)
        .resource("license", &id)
        .details(&json!({
            "license_key": license.license_key,
            "request_id": license.request_id,
        }))
        .save()?;

    tracing::info!(license_id = %id, admin_id = %ctx.user.id, "License deleted");
    Ok(Json(json!({ "deleted": true })))
}
