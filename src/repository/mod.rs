use crate::models::{
    Comment, NewPost, NewUser, Post, PostChanges, PostFilter, ProfileChanges, Tag, User,
    UserCredentials,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// StoreError
///
/// What can go wrong below the service layer. Constraint violations are split out so the
/// services can turn them into Conflict / NotFound instead of a blanket 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A foreign key pointed at a missing row. Carries the constraint name.
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// The persistence contract for users, posts, comments and tags. Handlers never see it
/// directly; the services wrap it with the existence and ownership rules.
///
/// **Send + Sync + async_trait** let `Arc<dyn Repository>` cross axum's task boundaries.
///
/// Every post read returns a fully populated `Post` (author, tags, comments, count).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    // Newest first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>>;
    // Cascades to the user's posts and comments. False when no row matched.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    // --- Tags ---
    async fn find_tag(&self, name: &str) -> StoreResult<Option<Tag>>;
    // Fails with `UniqueViolation` when the name already exists.
    async fn insert_tag(&self, name: &str) -> StoreResult<Tag>;

    // --- Posts ---
    // Newest first.
    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>>;
    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Option<Post>>;
    // Cascades to the post's comments and tag links.
    async fn delete_post(&self, id: i64) -> StoreResult<bool>;

    // --- Comments ---
    async fn get_comment(&self, id: i64) -> StoreResult<Option<Comment>>;
    async fn create_comment(&self, post_id: i64, author_id: Uuid, content: String) -> StoreResult<Comment>;
    async fn update_comment(&self, id: i64, content: Option<String>) -> StoreResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> StoreResult<bool>;
}

/// RepositoryState
///
/// The shared handle every service holds.
pub type RepositoryState = Arc<dyn Repository>;
