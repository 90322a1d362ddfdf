use super::{Repository, StoreError, StoreResult};
use crate::models::{
    AuthorSummary, Comment, NewPost, NewUser, Post, PostChanges, PostFilter, ProfileChanges, Tag,
    User, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Clone)]
struct UserRow {
    user: User,
    password_hash: String,
}

#[derive(Clone)]
struct PostRow {
    id: i64,
    title: String,
    content: Option<String>,
    author_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CommentRow {
    id: i64,
    content: String,
    post_id: i64,
    author_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<Uuid, UserRow>,
    posts: BTreeMap<i64, PostRow>,
    tags: BTreeMap<i64, Tag>,
    // (post_id, tag_id)
    post_tags: BTreeSet<(i64, i64)>,
    comments: BTreeMap<i64, CommentRow>,
    next_post_id: i64,
    next_tag_id: i64,
    next_comment_id: i64,
}

impl Tables {
    fn author(&self, id: Uuid) -> AuthorSummary {
        AuthorSummary {
            id,
            name: self
                .users
                .get(&id)
                .map(|row| row.user.name.clone())
                .unwrap_or_default(),
        }
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            content: row.content.clone(),
            post_id: row.post_id,
            author_id: row.author_id,
            author: self.author(row.author_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn post(&self, row: &PostRow) -> Post {
        let tags: Vec<Tag> = self
            .post_tags
            .iter()
            .filter(|(post_id, _)| *post_id == row.id)
            .filter_map(|(_, tag_id)| self.tags.get(tag_id).cloned())
            .collect();

        let mut comments: Vec<Comment> = self
            .comments
            .values()
            .filter(|c| c.post_id == row.id)
            .map(|c| self.comment(c))
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Post {
            id: row.id,
            title: row.title.clone(),
            content: row.content.clone(),
            author_id: row.author_id,
            author: self.author(row.author_id),
            tags,
            comment_count: comments.len() as i64,
            comments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|row| row.user.email == email && Some(row.user.id) != except)
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users.values().any(|row| {
            row.user.username.as_deref() == Some(username) && Some(row.user.id) != except
        })
    }

    fn link_tags(&mut self, post_id: i64, tag_ids: &[i64]) -> StoreResult<()> {
        if let Some(missing) = tag_ids.iter().find(|id| !self.tags.contains_key(id)) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "post_tags_tag_id_fkey ({})",
                missing
            )));
        }
        for tag_id in tag_ids {
            self.post_tags.insert((post_id, *tag_id));
        }
        Ok(())
    }

    fn remove_post(&mut self, id: i64) -> bool {
        if self.posts.remove(&id).is_none() {
            return false;
        }
        self.comments.retain(|_, c| c.post_id != id);
        self.post_tags.retain(|(post_id, _)| *post_id != id);
        true
    }
}

/// MemoryRepository
///
/// An in-process `Repository` with the same constraint semantics as the Postgres schema:
/// unique email/username/tag name, foreign keys on authors and posts, cascading deletes.
/// Used for local development without `DATABASE_URL` and by the test suite.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Lock poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let tables = self.read();
        Ok(tables
            .users
            .values()
            .find(|row| row.user.email == email)
            .map(|row| UserCredentials {
                id: row.user.id,
                name: row.user.name.clone(),
                email: row.user.email.clone(),
                password_hash: row.password_hash.clone(),
                role: row.user.role,
            }))
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&id).map(|row| row.user.clone()))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.read().users.values().map(|row| row.user.clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.write();
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        if let Some(username) = &user.username {
            if tables.username_taken(username, None) {
                return Err(StoreError::UniqueViolation("users_username_key".to_string()));
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            username: user.username,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            created.id,
            UserRow {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        let mut tables = self.write();
        if !tables.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
        }
        if let Some(username) = &changes.username {
            if tables.username_taken(username, Some(id)) {
                return Err(StoreError::UniqueViolation("users_username_key".to_string()));
            }
        }

        let Some(row) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.user.name = name;
        }
        if let Some(email) = changes.email {
            row.user.email = email;
        }
        if let Some(username) = changes.username {
            row.user.username = Some(username);
        }
        if let Some(hash) = changes.password_hash {
            row.password_hash = hash;
        }
        row.user.updated_at = Utc::now();
        Ok(Some(row.user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write();
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in owned {
            tables.remove_post(post_id);
        }
        tables.comments.retain(|_, c| c.author_id != id);
        Ok(true)
    }

    async fn find_tag(&self, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self.read().tags.values().find(|t| t.name == name).cloned())
    }

    async fn insert_tag(&self, name: &str) -> StoreResult<Tag> {
        let mut tables = self.write();
        if tables.tags.values().any(|t| t.name == name) {
            return Err(StoreError::UniqueViolation("tags_name_key".to_string()));
        }
        tables.next_tag_id += 1;
        let tag = Tag {
            id: tables.next_tag_id,
            name: name.to_string(),
        };
        tables.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>> {
        let tables = self.read();

        let tag_id = match &filter {
            PostFilter::Tag(name) => match tables.tags.values().find(|t| &t.name == name) {
                Some(tag) => Some(tag.id),
                None => return Ok(vec![]),
            },
            _ => None,
        };

        let mut rows: Vec<&PostRow> = tables
            .posts
            .values()
            .filter(|p| match &filter {
                PostFilter::All => true,
                PostFilter::Author(author_id) => p.author_id == *author_id,
                PostFilter::Tag(_) => tag_id
                    .map(|tag_id| tables.post_tags.contains(&(p.id, tag_id)))
                    .unwrap_or(false),
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows.into_iter().map(|row| tables.post(row)).collect())
    }

    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        let tables = self.read();
        Ok(tables.posts.get(&id).map(|row| tables.post(row)))
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut tables = self.write();
        if !tables.users.contains_key(&post.author_id) {
            return Err(StoreError::ForeignKeyViolation("posts_author_id_fkey".to_string()));
        }

        let id = tables.next_post_id + 1;
        tables.link_tags(id, &post.tag_ids)?;
        tables.next_post_id = id;

        let now = Utc::now();
        let row = PostRow {
            id,
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            created_at: now,
            updated_at: now,
        };
        let created = tables.post(&row);
        tables.posts.insert(id, row);
        Ok(created)
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Option<Post>> {
        let mut tables = self.write();
        if !tables.posts.contains_key(&id) {
            return Ok(None);
        }

        if let Some(tag_ids) = changes.tag_ids {
            let previous: Vec<(i64, i64)> = tables
                .post_tags
                .iter()
                .filter(|(post_id, _)| *post_id == id)
                .copied()
                .collect();
            tables.post_tags.retain(|(post_id, _)| *post_id != id);
            if let Err(e) = tables.link_tags(id, &tag_ids) {
                tables.post_tags.extend(previous);
                return Err(e);
            }
        }

        let Some(row) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(content) = changes.content {
            row.content = Some(content);
        }
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(Some(tables.post(&row)))
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        Ok(self.write().remove_post(id))
    }

    async fn get_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        let tables = self.read();
        Ok(tables.comments.get(&id).map(|row| tables.comment(row)))
    }

    async fn create_comment(&self, post_id: i64, author_id: Uuid, content: String) -> StoreResult<Comment> {
        let mut tables = self.write();
        if !tables.posts.contains_key(&post_id) {
            return Err(StoreError::ForeignKeyViolation("comments_post_id_fkey".to_string()));
        }
        if !tables.users.contains_key(&author_id) {
            return Err(StoreError::ForeignKeyViolation("comments_author_id_fkey".to_string()));
        }

        tables.next_comment_id += 1;
        let now = Utc::now();
        let row = CommentRow {
            id: tables.next_comment_id,
            content,
            post_id,
            author_id,
            created_at: now,
            updated_at: now,
        };
        let created = tables.comment(&row);
        tables.comments.insert(row.id, row);
        Ok(created)
    }

    async fn update_comment(&self, id: i64, content: Option<String>) -> StoreResult<Option<Comment>> {
        let mut tables = self.write();
        let Some(row) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(content) = content {
            row.content = content;
        }
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(Some(tables.comment(&row)))
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        Ok(self.write().comments.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            username: None,
            password_hash: "hash".to_string(),
            role: Role::Member,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let repo = MemoryRepository::new();
        repo.create_user(new_user("a@example.com")).await.unwrap();
        let err = repo.create_user(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(ref c) if c == "users_email_key"));
    }

    #[tokio::test]
    async fn test_post_requires_existing_author() {
        let repo = MemoryRepository::new();
        let err = repo
            .create_post(NewPost {
                author_id: Uuid::new_v4(),
                title: "orphan".to_string(),
                content: None,
                tag_ids: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn test_deleting_user_cascades() {
        let repo = MemoryRepository::new();
        let author = repo.create_user(new_user("a@example.com")).await.unwrap();
        let reader = repo.create_user(new_user("b@example.com")).await.unwrap();
        let post = repo
            .create_post(NewPost {
                author_id: author.id,
                title: "hello".to_string(),
                content: None,
                tag_ids: vec![],
            })
            .await
            .unwrap();
        let comment = repo
            .create_comment(post.id, reader.id, "nice".to_string())
            .await
            .unwrap();

        assert!(repo.delete_user(author.id).await.unwrap());
        assert!(repo.get_post(post.id).await.unwrap().is_none());
        assert!(repo.get_comment(comment.id).await.unwrap().is_none());
        assert!(!repo.delete_user(author.id).await.unwrap());
    }
}
