use axum::extract::Extension;

use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::models::User;

pub async fn me(Extension(ctx): Extension<UserContext>) -> Json<User> {
    Json(ctx.user)
}
