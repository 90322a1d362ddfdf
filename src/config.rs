use std::env;

/// Default token lifetime: one day.
pub const DEFAULT_JWT_EXPIRES_IN_SECS: i64 = 60 * 60 * 24;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and pulled
/// into handlers and extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Runtime environment marker. Controls log format and which secrets are mandatory.
    pub env: Env,
    // Secret used to sign and verify access tokens.
    pub jwt_secret: String,
    // Access token lifetime in seconds.
    pub jwt_expires_in_secs: i64,
    // Address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// The runtime context: `Local` for development conveniences, `Production` for
/// fail-fast configuration and JSON logs.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests: in-memory store, fixed secret.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_expires_in_secs: DEFAULT_JWT_EXPIRES_IN_SECS,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables.
    ///
    /// # Panics
    /// In production, panics when `DATABASE_URL` or `JWT_SECRET` is missing, so the
    /// server never starts with an in-memory store or a guessable signing key.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()).as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok(),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let jwt_expires_in_secs = env::var("JWT_EXPIRES_IN_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_JWT_EXPIRES_IN_SECS);

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            db_url,
            env,
            jwt_secret,
            jwt_expires_in_secs,
            bind_addr,
        }
    }
}
