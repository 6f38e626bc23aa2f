use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::licensing::validation::{self, AccountValidation};
use crate::models::is_valid_account_id;
use crate::rate_limit;

/// Terminals send the login either as a JSON string or a JSON number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AccountIdInput {
    Text(String),
    Number(u64),
}

impl AccountIdInput {
    fn into_string(self) -> String {
        match self {
            AccountIdInput::Text(s) => s,
            AccountIdInput::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateAccountBody {
    #[serde(default)]
    pub account_id: Option<AccountIdInput>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateAccountQuery {
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidateSuccess {
    success: bool,
    license: AccountValidation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateFailure {
    success: bool,
    error: String,
    is_active: bool,
}

fn failure(status: StatusCode, error: String) -> Response {
    let body = ValidateFailure {
        success: false,
        error,
        is_active: false,
    };
    (status, axum::Json(body)).into_response()
}

/// Render a validation outcome in the shape trading terminals parse:
/// errors keep `success: false` and `isActive: false` instead of the
/// generic error body.
fn respond(result: Result<AccountValidation>) -> Response {
    match result {
        Ok(license) => axum::Json(ValidateSuccess {
            success: true,
            license,
        })
        .into_response(),
        Err(err) => {
            let status = err.status();
            let message = if status.is_server_error() {
                tracing::error!("Account validation failed: {}", err);
                "Internal server error".to_string()
            } else {
                err.to_string()
            };
            failure(status, message)
        }
    }
}

fn validate(state: &AppState, account_id: Option<String>) -> Response {
    let Some(account_id) = account_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
    else {
        return respond(Err(AppError::Validation("account_id is required".into())));
    };
    // Malformed ids never become limiter keys.
    if !is_valid_account_id(&account_id) {
        return respond(Err(AppError::Validation("account_id must be numeric".into())));
    }

    if let Some(limiter) = &state.validate_limiter
        && !rate_limit::check_account(limiter, &account_id)
    {
        tracing::warn!(account_id = %account_id, "Validation rate limit exceeded");
        return failure(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many validation requests for this account".into(),
        );
    }

    let result = state.db.get().map_err(AppError::from).and_then(|conn| {
        validation::validate_account(&conn, &account_id, Utc::now().timestamp())
    });
    if let Ok(ref v) = result {
        tracing::debug!(account_id = %account_id, is_active = v.is_active, "Account validated");
    }
    respond(result)
}

/// POST /validate-account with `{"account_id": "..."}`
pub async fn validate_account_body(
    State(state): State<AppState>,
    body: std::result::Result<Json<ValidateAccountBody>, AppError>,
) -> Response {
    match body {
        Ok(Json(body)) => validate(&state, body.account_id.map(AccountIdInput::into_string)),
        Err(err) => respond(Err(err)),
    }
}

/// GET /validate-account?account_id=...
pub async fn validate_account_query(
    State(state): State<AppState>,
    query: std::result::Result<Query<ValidateAccountQuery>, AppError>,
) -> Response {
    match query {
        Ok(Query(query)) => validate(&state, query.account_id),
        Err(err) => respond(Err(err)),
    }
}
