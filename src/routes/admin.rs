use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Account oversight. Each handler calls `require_roles(&[Role::Admin], ..)` before touching
/// the store, so a `MEMBER` token is answered with 403 and a missing token with 401.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users))
        .route(
            "/users/{id}",
            get(handlers::get_user).delete(handlers::delete_user),
        )
}
