use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Role,
    token::{TokenError, TokenIssuer},
};

/// Identity
///
/// The minimal claim set produced by a successful credential check and embedded in the
/// access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
    pub roles: Vec<String>,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an argument and
/// use `id` for ownership checks and `roles` for `require_roles`. It is built purely from the
/// verified token; client-supplied ids never reach it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub roles: Vec<String>,
}

impl From<Identity> for AuthUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            name: identity.name,
            roles: identity.roles,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Pulls the `TokenIssuer` out of the application state.
/// 2. Requires an `Authorization: Bearer <token>` header.
/// 3. Verifies signature and expiry and maps the claims to an `AuthUser`.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenIssuer::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = tokens.verify(token.trim()).map_err(|e| {
            tracing::debug!("rejected bearer token: {}", e);
            match e {
                TokenError::Expired => AppError::Unauthorized("Token expired".to_string()),
                _ => AppError::Unauthorized("Invalid token".to_string()),
            }
        })?;

        Ok(claims.identity().into())
    }
}

/// authorize
///
/// Pure role check. True when nothing is required, otherwise when any caller role matches
/// any required role ignoring ASCII case. A caller without roles never satisfies a
/// non-empty requirement.
pub fn authorize<R, C>(required_roles: &[R], caller_roles: &[C]) -> bool
where
    R: AsRef<str>,
    C: AsRef<str>,
{
    if required_roles.is_empty() {
        return true;
    }

    required_roles.iter().any(|required| {
        caller_roles
            .iter()
            .any(|role| role.as_ref().eq_ignore_ascii_case(required.as_ref()))
    })
}

/// require_roles
///
/// Handler-side guard around `authorize`: `Forbidden` when the caller lacks every
/// required role.
pub fn require_roles(required: &[Role], user: &AuthUser) -> Result<(), AppError> {
    let required: Vec<&str> = required.iter().map(Role::as_str).collect();
    if authorize(&required, &user.roles) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.id, ?required, "role check failed");
        Err(AppError::Forbidden("Insufficient permissions".to_string()))
    }
}
