use crate::{
    AppState,
    auth::{AuthUser, require_roles},
    error::{AppResult, ErrorResponse},
    models::{
        Comment, CreateCommentRequest, CreatePostRequest, LoginRequest, LoginResponse,
        MessageResponse, Post, PostListQuery, RegisterRequest, Role, UpdateCommentRequest,
        UpdatePostRequest, UpdateProfileRequest, User,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

// --- Landing ---

#[utoipa::path(get, path = "/", responses((status = 200, description = "Home page", body = String)))]
pub async fn home() -> &'static str {
    "Home Page"
}

#[utoipa::path(get, path = "/about", responses((status = 200, description = "About page", body = String)))]
pub async fn about() -> &'static str {
    "About Page!"
}

// --- Authentication ---

/// register
///
/// [Public Route] Creates a `MEMBER` account. The response never echoes the user or the hash.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = MessageResponse),
        (status = 409, description = "Email or username already in use", body = ErrorResponse),
        (status = 422, description = "Validation failed", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    payload.validate()?;

    state
        .auth
        .register(payload.name, payload.email, &payload.password, payload.username)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Registration successful!")),
    ))
}

/// login
///
/// [Public Route] Exchanges credentials for a signed access token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    payload.validate()?;
    let response = state.auth.authenticate(&payload.email, &payload.password).await?;
    Ok(Json(response))
}

// --- Posts ---

/// list_posts
///
/// [Public Route] Newest first. `tag` takes precedence over `authorId` when both are sent.
#[utoipa::path(
    get,
    path = "/posts",
    params(PostListQuery),
    responses((status = 200, description = "Posts", body = [Post]))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let posts = state.posts.list_posts(query.into_filter()).await?;
    Ok(Json(posts))
}

#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_post(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Post>> {
    Ok(Json(state.posts.get_post(id).await?))
}

/// create_post
///
/// [Authenticated Route] The author is always the caller; there is no way to post on
/// someone else's behalf.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn create_post(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    payload.validate()?;
    let post = state.posts.create_post(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Owner-only.
#[utoipa::path(
    patch,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_post(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    payload.validate()?;
    let post = state.posts.update_post(id, payload, user_id).await?;
    Ok(Json(post))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_post(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    state.posts.delete_post(id, user_id).await?;
    Ok(Json(MessageResponse::new("Post deleted successfully!")))
}

// --- Comments ---

#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 404, description = "Post not found", body = ErrorResponse)
    )
)]
pub async fn create_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    payload.validate()?;
    let comment = state.comments.create_comment(post_id, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// update_comment
///
/// [Authenticated Route] 404 when the comment does not exist under this post, 403 when the
/// caller is not its author.
#[utoipa::path(
    patch,
    path = "/posts/{id}/comments/{comment_id}",
    params(
        ("id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    payload.validate()?;
    let comment = state
        .comments
        .update_comment(post_id, comment_id, payload, user_id)
        .await?;
    Ok(Json(comment))
}

#[utoipa::path(
    delete,
    path = "/posts/{id}/comments/{comment_id}",
    params(
        ("id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Json<MessageResponse>> {
    state
        .comments
        .delete_comment(post_id, comment_id, user_id)
        .await?;
    Ok(Json(MessageResponse::new("Comment deleted successfully!")))
}

// --- Profile ---

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Caller's profile", body = User),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn get_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.get_profile(id).await?))
}

/// update_profile
///
/// [Authenticated Route] Always targets the caller. A supplied password is re-hashed.
#[utoipa::path(
    patch,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = User),
        (status = 409, description = "Email or username already in use", body = ErrorResponse)
    )
)]
pub async fn update_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    payload.validate()?;
    Ok(Json(state.users.update_profile(id, payload).await?))
}

// --- Administration ---

/// list_users
///
/// [Admin Route] The role check runs first; a `MEMBER` token gets 403 before any lookup.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Admin only", body = ErrorResponse)
    )
)]
pub async fn list_users(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    require_roles(&[Role::Admin], &user)?;
    Ok(Json(state.users.list_users().await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    require_roles(&[Role::Admin], &user)?;
    Ok(Json(state.users.get_user(id).await?))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    require_roles(&[Role::Admin], &user)?;
    state.users.delete_user(id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully!")))
}
