use crate::{
    auth::Identity,
    error::{AppError, AppResult},
    models::{LoginResponse, LoginUser, NewUser, Role, User},
    password,
    repository::RepositoryState,
    token::TokenIssuer,
};

/// AuthService
///
/// Registration, credential checks and token issuance.
#[derive(Clone)]
pub struct AuthService {
    repo: RepositoryState,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(repo: RepositoryState, tokens: TokenIssuer) -> Self {
        Self { repo, tokens }
    }

    /// register
    ///
    /// Creates a `MEMBER` account. Conflict when the email is taken, whether that is seen by
    /// the lookup here or by the store's unique constraint on a concurrent insert.
    pub async fn register(
        &self,
        name: String,
        email: String,
        password: &str,
        username: Option<String>,
    ) -> AppResult<User> {
        if self.repo.find_credentials_by_email(&email).await?.is_some() {
            tracing::info!(%email, "registration rejected: email already in use");
            return Err(AppError::Conflict("Email already in use!".to_string()));
        }

        let password_hash = password::hash_password(password)?;

        let user = self
            .repo
            .create_user(NewUser {
                name,
                email,
                username,
                password_hash,
                role: Role::default(),
            })
            .await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// validate_credentials
    ///
    /// `Ok(None)` for an unknown email or a wrong password; the caller decides how to
    /// surface that. Errors are reserved for store or hash failures.
    pub async fn validate_credentials(&self, email: &str, password: &str) -> AppResult<Option<Identity>> {
        let Some(user) = self.repo.find_credentials_by_email(email).await? else {
            return Ok(None);
        };

        if !password::verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        Ok(Some(Identity {
            user_id: user.id,
            name: user.name,
            roles: vec![user.role.as_str().to_string()],
        }))
    }

    /// login
    ///
    /// Signs an access token for an already validated identity.
    pub fn login(&self, identity: Identity) -> AppResult<LoginResponse> {
        let access_token = self.tokens.issue(&identity)?;

        tracing::info!(user_id = %identity.user_id, "login successful");

        Ok(LoginResponse {
            message: "Login successful".to_string(),
            access_token,
            user: LoginUser {
                id: identity.user_id,
                name: identity.name,
                roles: identity.roles,
            },
        })
    }

    /// authenticate
    ///
    /// `validate_credentials` + `login`, with "no match" surfaced as Unauthorized.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        match self.validate_credentials(email, password).await? {
            Some(identity) => self.login(identity),
            None => {
                tracing::warn!(%email, "login failed: invalid credentials");
                Err(AppError::Unauthorized("Invalid credentials".to_string()))
            }
        }
    }
}
