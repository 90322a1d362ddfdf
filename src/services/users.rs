use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ProfileChanges, UpdateProfileRequest, User},
    password,
    repository::RepositoryState,
};

/// UserService
///
/// Self-service profile access and the admin user-management operations. Role checks
/// happen in the handlers before these are called.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
}

impl UserService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn get_profile(&self, caller_id: Uuid) -> AppResult<User> {
        self.get_user(caller_id).await
    }

    /// update_profile
    ///
    /// A new password is re-hashed before it reaches the store. The role cannot be changed
    /// through this path.
    pub async fn update_profile(&self, caller_id: Uuid, req: UpdateProfileRequest) -> AppResult<User> {
        let password_hash = match req.password.as_deref() {
            Some(plain) => Some(password::hash_password(plain)?),
            None => None,
        };

        let changes = ProfileChanges {
            name: req.name,
            email: req.email,
            username: req.username,
            password_hash,
        };

        self.repo
            .update_user(caller_id, changes)
            .await?
            .ok_or_else(|| user_not_found(caller_id))
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.repo.list_users().await?)
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| user_not_found(id))
    }

    pub async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        if !self.repo.delete_user(id).await? {
            return Err(user_not_found(id));
        }
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }
}

fn user_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("User with ID {} not found", id))
}
