//! Business rules between the request layer and the `Repository`.
//!
//! Each service is a small `Clone` struct built explicitly from the shared repository
//! handle (and the token issuer where needed). They signal `AppError` kinds; the handlers
//! only translate them.

pub mod auth;
pub mod comments;
pub mod posts;
pub mod users;

pub use auth::AuthService;
pub use comments::CommentService;
pub use posts::PostService;
pub use users::UserService;
