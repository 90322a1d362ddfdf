use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod services;
pub mod token;

// Routing split by access level (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use services::{AuthService, CommentService, PostService, UserService};
pub use token::TokenIssuer;

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json` and
/// browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home, handlers::about, handlers::register, handlers::login,
        handlers::list_posts, handlers::get_post, handlers::create_post, handlers::update_post,
        handlers::delete_post, handlers::create_comment, handlers::update_comment,
        handlers::delete_comment, handlers::get_profile, handlers::update_profile,
        handlers::list_users, handlers::get_user, handlers::delete_user
    ),
    components(
        schemas(
            models::Role, models::User, models::AuthorSummary, models::Tag, models::Comment,
            models::Post, models::RegisterRequest, models::LoginRequest, models::CreatePostRequest,
            models::UpdatePostRequest, models::CreateCommentRequest, models::UpdateCommentRequest,
            models::UpdateProfileRequest, models::LoginUser, models::LoginResponse,
            models::MessageResponse, error::ErrorResponse, error::ValidationErrorDetail,
        )
    ),
    tags(
        (name = "quill", description = "Quill blogging API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state handed to every handler. Services hold their own clone of the
/// repository handle, so cloning the state is a handful of `Arc` bumps.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenIssuer,
    pub auth: AuthService,
    pub posts: PostService,
    pub comments: CommentService,
    pub users: UserService,
}

impl AppState {
    /// Wires every service from one repository and one configuration.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let tokens = TokenIssuer::from_config(&config);
        Self {
            auth: AuthService::new(repo.clone(), tokens.clone()),
            posts: PostService::new(repo.clone()),
            comments: CommentService::new(repo.clone()),
            users: UserService::new(repo),
            tokens,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Needed by the `AuthUser` extractor.
impl FromRef<AppState> for TokenIssuer {
    fn from_ref(app_state: &AppState) -> TokenIssuer {
        app_state.tokens.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated router. Extracting `AuthUser` is the whole check: a missing,
/// malformed, forged or expired token is rejected with 401 before the handler runs.
async fn auth_middleware(auth_user: AuthUser, request: Request, next: Next) -> Response {
    tracing::debug!(user_id = %auth_user.id, user = %auth_user.name, "authenticated request");
    next.run(request).await
}

/// create_router
///
/// Assembles every route, the authentication layer, the request-id/trace stack and CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Role checks happen inside the admin handlers; `AuthUser` still yields 401 first.
        .merge(admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span with method, URI and the `x-request-id` so every log line of
/// one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
