mod catalog;
mod mql5;
mod validate;

pub use catalog::*;
pub use mql5::*;
pub use validate::*;

use axum::{
    Router,
    extract::State,
    routing::get,
};
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness plus a round trip to the database.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let conn = state.db.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plans", get(list_active_plans))
        .route("/plans/{id}", get(get_active_plan))
        .route("/payment-methods", get(list_active_payment_methods))
        .route(
            "/validate-account",
            get(validate_account_query).post(validate_account_body),
        )
        .route(
            "/mql5/validate-account",
            get(validate_account_query).post(validate_account_body),
        )
        .route("/mql5/ping", get(ping).post(ping_echo))
}
