use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Landing pages, the credential exchange and read-only access to posts.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::home))
        .route("/about", get(handlers::about))
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        // GET /posts?tag=...&authorId=...
        .route("/posts", get(handlers::list_posts))
        .route("/posts/{id}", get(handlers::get_post))
}
