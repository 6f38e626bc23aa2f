mod me;
mod payments;
mod requests;

pub use me::*;
pub use payments::*;
pub use requests::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::user_auth;

/// Routes for any authenticated user. Admins use the same routes and see
/// everyone's records.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/{id}", get(get_request).patch(edit_request))
        .route("/payments", post(submit_payment).get(list_payments))
        .route("/payments/{id}", get(get_payment))
        .layer(middleware::from_fn_with_state(state, user_auth))
}
