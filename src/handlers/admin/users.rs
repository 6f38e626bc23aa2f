use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::UserContext;
use crate::models::{
    AuditAction, CreateUser, UpdateUser, User, UserCreated, UserListQuery, UserRole,
};
use crate::pagination::{Paginated, clamp_limit, clamp_offset};
use crate::util::AuditLogBuilder;

/// Create a user and return their API key. The key is not retrievable later.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    headers: HeaderMap,
    Json(input): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserCreated>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let api_key = queries::generate_api_key();
    let user = queries::create_user(&conn, &input, &api_key)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::CreateUser)
        .resource("user", &user.id)
        .details(&json!({ "email": user.email, "role": user.role }))
        .save()?;

    tracing::info!(user_id = %user.id, role = user.role.as_ref(), "User created");
    Ok((StatusCode::CREATED, Json(UserCreated { user, api_key })))
}

/// GET /admin/users?search=...
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Paginated<User>>> {
    let conn = state.db.get()?;
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let (users, total) =
        queries::list_users_paginated(&conn, query.search.as_deref(), limit, offset)?;
    Ok(Json(Paginated::new(users, total, limit, offset)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

/// PUT /admin/users/{id}
///
/// Admins cannot demote themselves, so at least one admin always remains.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>> {
    input.validate()?;
    if id == ctx.user.id && input.role == Some(UserRole::User) {
        return Err(AppError::Validation("Cannot remove your own admin role".into()));
    }

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::update_user(&conn, &id, &input)? {
        return Err(AppError::NotFound("User not found".into()));
    }
    let user = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::UpdateUser)
        .resource("user", &id)
        .details(&json!({
            "email": input.email.as_ref().map(|_| &user.email),
            "name": input.name.as_ref().map(|_| &user.name),
            "role": input.role,
        }))
        .save()?;

    tracing::info!(user_id = %id, admin_id = %ctx.user.id, "User updated");
    Ok(Json(user))
}

/// DELETE /admin/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    if id == ctx.user.id {
        return Err(AppError::Validation("Cannot delete your own account".into()));
    }

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let user = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if !queries::delete_user(&conn, &id)? {
        return Err(AppError::NotFound("User not found".into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(Some(&ctx.user.id))
        .action(AuditAction::DeleteUser)
        .resource("user", &id)
        .details(&json!({ "email": user.email, "role": user.role }))
        .save()?;

    tracing::info!(user_id = %id, admin_id = %ctx.user.id, "User deleted");
    Ok(Json(json!({ "deleted": true })))
}
