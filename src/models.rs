use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// The RBAC field on a user. Stored as the Postgres enum `user_role` and serialized in
/// upper case (`"ADMIN"`, `"MEMBER"`), which is also the form embedded in token claims.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Member => "MEMBER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User
///
/// Public projection of a row in the `users` table. The password hash is never part of
/// this struct, so anything that serializes a `User` cannot leak it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal row used only by the authentication flow. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Insert payload for the `users` table. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update for a user row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

/// AuthorSummary
///
/// The `{id, name}` slice of a user attached to posts and comments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
}

/// Tag
///
/// A row from the `tags` table. Names are unique; rows are created on first use.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq, Eq)]
#[ts(export)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Comment
///
/// A comment on a post, enriched with its author's summary.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: Uuid,
    pub author: AuthorSummary,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Post
///
/// A post with every relation populated: author, tags, comments and the comment count.
/// This is the aggregate returned by all post reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub author_id: Uuid,
    pub author: AuthorSummary,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
    pub comment_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a post. Tags have already been resolved to ids.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub tag_ids: Vec<i64>,
}

/// Partial update for a post. `Some(tag_ids)` replaces the whole tag set.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tag_ids: Option<Vec<i64>>,
}

/// PostFilter
///
/// The single filter applied to a post listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Tag(String),
    Author(Uuid),
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for POST /auth/register.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: Option<String>,
}

/// LoginRequest
///
/// Input payload for POST /auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
}

/// CreatePostRequest
///
/// Input payload for POST /posts. Tag names are find-or-created.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// UpdatePostRequest
///
/// Partial update payload for PATCH /posts/{id}. When `tags` is present the post's tag set
/// is replaced, not merged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// CreateCommentRequest
///
/// Input payload for POST /posts/{postId}/comments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "Comment must not be empty"))]
    pub content: String,
}

/// UpdateCommentRequest
///
/// Partial update payload for PATCH /posts/{postId}/comments/{commentId}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Comment must not be empty"))]
    pub content: Option<String>,
}

/// UpdateProfileRequest
///
/// Partial update payload for PATCH /profile. There is no role field.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

/// PostListQuery
///
/// Query parameters for GET /posts. When both are present `tag` wins.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    /// Only posts carrying this tag name.
    pub tag: Option<String>,
    /// Only posts written by this user.
    pub author_id: Option<Uuid>,
}

impl PostListQuery {
    pub fn into_filter(self) -> PostFilter {
        match (self.tag, self.author_id) {
            (Some(tag), _) if !tag.is_empty() => PostFilter::Tag(tag),
            (_, Some(author_id)) => PostFilter::Author(author_id),
            _ => PostFilter::All,
        }
    }
}

// --- Response Schemas (Output) ---

/// Identity embedded in the login response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct LoginUser {
    pub id: Uuid,
    pub name: String,
    pub roles: Vec<String>,
}

/// LoginResponse
///
/// Output of POST /auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub user: LoginUser,
}

/// MessageResponse
///
/// A stable, human-readable acknowledgement returned by mutations without a body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
