use uuid::Uuid;

use super::posts::{ensure_author, post_not_found};
use crate::{
    error::{AppError, AppResult},
    models::{Comment, CreateCommentRequest, UpdateCommentRequest},
    repository::RepositoryState,
};

/// CommentService
///
/// Comments on posts. Only a comment's author may edit or delete it; there is no admin
/// override.
#[derive(Clone)]
pub struct CommentService {
    repo: RepositoryState,
}

impl CommentService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: Uuid,
        req: CreateCommentRequest,
    ) -> AppResult<Comment> {
        if self.repo.get_post(post_id).await?.is_none() {
            return Err(post_not_found(post_id));
        }

        let comment = self.repo.create_comment(post_id, author_id, req.content).await?;
        tracing::info!(comment_id = comment.id, post_id, %author_id, "comment created");
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        post_id: i64,
        comment_id: i64,
        req: UpdateCommentRequest,
        requester_id: Uuid,
    ) -> AppResult<Comment> {
        let comment = self.find_on_post(post_id, comment_id).await?;
        ensure_author(comment.author_id, requester_id, "You can only edit your own comments!")?;

        self.repo
            .update_comment(comment_id, req.content)
            .await?
            .ok_or_else(|| comment_not_found(comment_id))
    }

    pub async fn delete_comment(&self, post_id: i64, comment_id: i64, requester_id: Uuid) -> AppResult<()> {
        let comment = self.find_on_post(post_id, comment_id).await?;
        ensure_author(comment.author_id, requester_id, "You can only delete your own comments!")?;

        if !self.repo.delete_comment(comment_id).await? {
            return Err(comment_not_found(comment_id));
        }

        tracing::info!(comment_id, post_id, "comment deleted");
        Ok(())
    }

    // A comment addressed through the wrong post is treated as missing.
    async fn find_on_post(&self, post_id: i64, comment_id: i64) -> AppResult<Comment> {
        match self.repo.get_comment(comment_id).await? {
            Some(comment) if comment.post_id == post_id => Ok(comment),
            _ => Err(comment_not_found(comment_id)),
        }
    }
}

fn comment_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Comment with ID {} not found!", id))
}
