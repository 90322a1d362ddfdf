use super::{Repository, StoreError, StoreResult};
use crate::models::{
    AuthorSummary, Comment, NewPost, NewUser, Post, PostChanges, PostFilter, ProfileChanges, Tag,
    User, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, migrate::MigrateError, query_builder::QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, username, role, created_at, updated_at";

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, u.name AS author_name, p.created_at, p.updated_at
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.content, c.post_id, c.author_id, u.name AS author_name, c.created_at, c.updated_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

// --- Row types (joined shapes that don't map 1:1 onto the models) ---

#[derive(FromRow)]
struct PostRow {
    id: i64,
    title: String,
    content: Option<String>,
    author_id: Uuid,
    author_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PostTagRow {
    post_id: i64,
    id: i64,
    name: String,
}

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    content: String,
    post_id: i64,
    author_id: Uuid,
    author_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            content: row.content,
            post_id: row.post_id,
            author_id: row.author_id,
            author: AuthorSummary {
                id: row.author_id,
                name: row.author_name,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the SQL migrations under `migrations/`.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// hydrate
    ///
    /// Attaches tags and comments to a batch of post rows with one query each, instead of
    /// one round trip per post.
    async fn hydrate(&self, rows: Vec<PostRow>) -> StoreResult<Vec<Post>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let tag_rows = sqlx::query_as::<_, PostTagRow>(
            r#"
            SELECT pt.post_id, t.id, t.name
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ANY($1)
            ORDER BY t.id
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let comment_rows = sqlx::query_as::<_, CommentRow>(&format!(
            "{} WHERE c.post_id = ANY($1) ORDER BY c.created_at ASC, c.id ASC",
            COMMENT_SELECT
        ))
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in tag_rows {
            tags.entry(row.post_id).or_default().push(Tag {
                id: row.id,
                name: row.name,
            });
        }

        let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
        for row in comment_rows {
            comments.entry(row.post_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let comments = comments.remove(&row.id).unwrap_or_default();
                Post {
                    id: row.id,
                    title: row.title,
                    content: row.content,
                    author_id: row.author_id,
                    author: AuthorSummary {
                        id: row.author_id,
                        name: row.author_name,
                    },
                    tags: tags.remove(&row.id).unwrap_or_default(),
                    comment_count: comments.len() as i64,
                    comments,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                }
            })
            .collect())
    }

    async fn fetch_post(&self, id: i64) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.id = $1", POST_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        Ok(sqlx::query_as::<_, UserCredentials>(
            "SELECT id, name, email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        Ok(sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, username, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user.name)
        .bind(user.email)
        .bind(user.username)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Uses `COALESCE` so that only the supplied columns change.
    async fn update_user(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                username = COALESCE($4, username),
                password_hash = COALESCE($5, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.username)
        .bind(changes.password_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- TAGS ---

    async fn find_tag(&self, name: &str) -> StoreResult<Option<Tag>> {
        Ok(sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_tag(&self, name: &str) -> StoreResult<Tag> {
        Ok(
            sqlx::query_as::<_, Tag>("INSERT INTO tags (name) VALUES ($1) RETURNING id, name")
                .bind(name)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    // --- POSTS ---

    /// list_posts
    ///
    /// One optional `WHERE` clause built with `QueryBuilder` so every value is bound.
    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_SELECT);

        match filter {
            PostFilter::All => {}
            PostFilter::Tag(name) => {
                builder.push(
                    " WHERE EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
                     WHERE pt.post_id = p.id AND t.name = ",
                );
                builder.push_bind(name);
                builder.push(")");
            }
            PostFilter::Author(author_id) => {
                builder.push(" WHERE p.author_id = ");
                builder.push_bind(author_id);
            }
        }

        builder.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = builder
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        self.fetch_post(id).await
    }

    /// create_post
    ///
    /// Post row and tag links go in one transaction. A missing author trips the
    /// `posts_author_id_fkey` constraint.
    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (title, content, author_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post.title)
        .bind(post.content)
        .bind(post.author_id)
        .fetch_one(&mut *tx)
        .await?;

        for tag_id in post.tag_ids {
            sqlx::query(
                "INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.fetch_post(id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// update_post
    ///
    /// `COALESCE` for the scalar columns; a supplied tag set replaces the old links.
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        if let Some(tag_ids) = changes.tag_ids {
            sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            for tag_id in tag_ids {
                sqlx::query(
                    "INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.fetch_post(id).await
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn get_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(&format!("{} WHERE c.id = $1", COMMENT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Comment::from))
    }

    /// Inserts and joins the author name in one statement via a CTE.
    async fn create_comment(&self, post_id: i64, author_id: Uuid, content: String) -> StoreResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (content, post_id, author_id) VALUES ($1, $2, $3)
                RETURNING id, content, post_id, author_id, created_at, updated_at
            )
            SELECT i.id, i.content, i.post_id, i.author_id, u.name AS author_name, i.created_at, i.updated_at
            FROM inserted i JOIN users u ON i.author_id = u.id
            "#,
        )
        .bind(content)
        .bind(post_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_comment(&self, id: i64, content: Option<String>) -> StoreResult<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH updated AS (
                UPDATE comments
                SET content = COALESCE($2, content),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING id, content, post_id, author_id, created_at, updated_at
            )
            SELECT d.id, d.content, d.post_id, d.author_id, u.name AS author_name, d.created_at, d.updated_at
            FROM updated d JOIN users u ON d.author_id = u.id
            "#,
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Comment::from))
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
