use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::Identity, config::AppConfig};

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to create token: {0}")]
    Create(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Claims
///
/// The payload signed into every access token. Tokens are stateless: whatever is in
/// here is trusted until `exp`, there is no server-side revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    /// Display name at the time of login.
    pub name: String,
    /// Role names, e.g. `["MEMBER"]`.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Unique token id, so two logins within the same second still differ.
    pub jti: Uuid,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            name: self.name.clone(),
            roles: self.roles.clone(),
        }
    }
}

/// TokenIssuer
///
/// Signs and verifies HS256 access tokens with the configured secret and lifetime.
/// Cloning is cheap enough to hand one to every service that needs it.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::seconds(config.jwt_expires_in_secs))
    }

    /// issue
    ///
    /// Signs a token for the given identity, valid for the configured lifetime.
    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.user_id,
            name: identity.name.clone(),
            roles: identity.roles.clone(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
            jti: Uuid::new_v4(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Create(e.to_string()))
    }

    /// verify
    ///
    /// Checks signature and expiry and returns the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}
