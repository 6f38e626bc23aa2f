pub mod admin;
pub mod public;
pub mod users;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::AppState;

/// The complete HTTP surface: public routes, authenticated user routes and
/// admin routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(users::router(state.clone()))
        .merge(admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
