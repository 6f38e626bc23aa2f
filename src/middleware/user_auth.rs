use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::util::extract_bearer_token;

/// The authenticated caller, inserted as a request extension.
#[derive(Clone)]
pub struct UserContext {
    pub user: User,
}

/// Resolve the bearer API key to a user.
fn authenticate_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let api_key = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let conn = state.db.get()?;
    queries::get_user_by_api_key(&conn, api_key)?.ok_or(AppError::Unauthorized)
}

pub async fn user_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate_user(&state, request.headers())?;
    request.extensions_mut().insert(UserContext { user });
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate_user(&state, request.headers())?;
    if !user.is_admin() {
        tracing::warn!(user_id = %user.id, path = %request.uri().path(), "Non-admin refused");
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    request.extensions_mut().insert(UserContext { user });
    Ok(next.run(request).await)
}
