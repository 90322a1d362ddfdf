use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Writes to posts and comments plus the caller's own profile. Every handler here also
/// takes `AuthUser`, whose id is the only identity used for ownership checks.
///
/// The path parameter names match the public router's (`/posts/{id}`) so the two can be
/// merged onto the same paths.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/posts", post(handlers::create_post))
        // PATCH/DELETE /posts/{id}
        // Owner-only; checked in the post service.
        .route(
            "/posts/{id}",
            patch(handlers::update_post).delete(handlers::delete_post),
        )
        .route("/posts/{id}/comments", post(handlers::create_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            patch(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route(
            "/profile",
            get(handlers::get_profile).patch(handlers::update_profile),
        )
}
