mod audit_logs;
mod licenses;
mod payment_methods;
mod payments;
mod plans;
mod requests;
mod users;

pub use audit_logs::*;
pub use licenses::*;
pub use payment_methods::*;
pub use payments::*;
pub use plans::*;
pub use requests::*;
pub use users::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::db::AppState;
use crate::middleware::require_admin;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Workflow decisions
        .route("/admin/requests/{id}/decision", put(decide_request))
        .route("/admin/requests/{id}", delete(delete_request))
        .route("/admin/payments/{id}/decision", put(decide_payment))
        // Licenses
        .route("/admin/licenses", post(create_license).get(list_licenses))
        .route(
            "/admin/licenses/{id}",
            get(get_license).put(update_license).delete(delete_license),
        )
        // Catalog
        .route("/admin/plans", post(create_plan).get(list_all_plans))
        .route("/admin/plans/{id}", put(update_plan).delete(delete_plan))
        .route(
            "/admin/payment-methods",
            post(create_payment_method).get(list_all_payment_methods),
        )
        .route(
            "/admin/payment-methods/{id}",
            put(update_payment_method).delete(delete_payment_method),
        )
        // Users and audit trail
        .route("/admin/users", post(create_user).get(list_users))
        .route(
            "/admin/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/admin/audit-logs", get(query_audit_logs))
        .layer(middleware::from_fn_with_state(state, require_admin))
}
