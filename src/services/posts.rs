use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{CreatePostRequest, NewPost, Post, PostChanges, PostFilter, Tag, UpdatePostRequest},
    repository::{Repository, RepositoryState, StoreError},
};

/// How many times a tag lookup is retried after losing an insert race.
const TAG_RETRY_LIMIT: usize = 3;

/// PostService
///
/// Post CRUD plus the tag find-or-create rule. Mutations are restricted to the author.
#[derive(Clone)]
pub struct PostService {
    repo: RepositoryState,
}

impl PostService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn list_posts(&self, filter: PostFilter) -> AppResult<Vec<Post>> {
        Ok(self.repo.list_posts(filter).await?)
    }

    pub async fn get_post(&self, id: i64) -> AppResult<Post> {
        self.repo
            .get_post(id)
            .await?
            .ok_or_else(|| post_not_found(id))
    }

    /// create_post
    ///
    /// The author is not looked up first: a dangling `author_id` is rejected by the store's
    /// foreign key and comes back as NotFound.
    pub async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> AppResult<Post> {
        let tag_ids = match req.tags {
            Some(names) => resolve_tags(self.repo.as_ref(), &names).await?,
            None => vec![],
        };

        let post = self
            .repo
            .create_post(NewPost {
                author_id,
                title: req.title,
                content: req.content,
                tag_ids,
            })
            .await?;

        tracing::info!(post_id = post.id, %author_id, "post created");
        Ok(post)
    }

    /// update_post
    ///
    /// Only supplied fields change. Supplied tags replace the whole set.
    pub async fn update_post(&self, id: i64, req: UpdatePostRequest, requester_id: Uuid) -> AppResult<Post> {
        let existing = self.get_post(id).await?;
        ensure_author(existing.author_id, requester_id, "You can only edit your own posts!")?;

        let tag_ids = match req.tags {
            Some(names) => Some(resolve_tags(self.repo.as_ref(), &names).await?),
            None => None,
        };

        self.repo
            .update_post(
                id,
                PostChanges {
                    title: req.title,
                    content: req.content,
                    tag_ids,
                },
            )
            .await?
            .ok_or_else(|| post_not_found(id))
    }

    pub async fn delete_post(&self, id: i64, requester_id: Uuid) -> AppResult<()> {
        let existing = self.get_post(id).await?;
        ensure_author(existing.author_id, requester_id, "You can only delete your own posts!")?;

        if !self.repo.delete_post(id).await? {
            return Err(post_not_found(id));
        }

        tracing::info!(post_id = id, "post deleted");
        Ok(())
    }
}

pub(crate) fn post_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Post with ID {} not found", id))
}

pub(crate) fn ensure_author(author_id: Uuid, requester_id: Uuid, message: &str) -> AppResult<()> {
    if author_id == requester_id {
        Ok(())
    } else {
        tracing::warn!(%author_id, %requester_id, "ownership check failed");
        Err(AppError::Forbidden(message.to_string()))
    }
}

/// resolve_tags
///
/// Trims names, drops blanks and duplicates, and find-or-creates each one. Returns the
/// tag ids in first-seen order.
pub async fn resolve_tags(repo: &dyn Repository, names: &[String]) -> AppResult<Vec<i64>> {
    let mut seen: Vec<&str> = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }

    let mut ids = Vec::with_capacity(seen.len());
    for name in seen {
        ids.push(find_or_create_tag(repo, name).await?.id);
    }
    Ok(ids)
}

/// find_or_create_tag
///
/// Returns the existing tag with this name or inserts it. Two writers racing on the same
/// new name both reach the insert; the loser gets a unique violation and finds the
/// winner's row on the next lookup.
pub async fn find_or_create_tag(repo: &dyn Repository, name: &str) -> AppResult<Tag> {
    for attempt in 1..=TAG_RETRY_LIMIT {
        if let Some(tag) = repo.find_tag(name).await? {
            return Ok(tag);
        }

        match repo.insert_tag(name).await {
            Ok(tag) => return Ok(tag),
            Err(StoreError::UniqueViolation(_)) => {
                tracing::debug!(tag = name, attempt, "tag insert lost a race, retrying lookup");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Conflict(format!("Could not create tag '{}'", name)))
}
