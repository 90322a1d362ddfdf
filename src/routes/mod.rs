/// Router Module Index
///
/// Routes are split by the access they require. Authentication is applied as a layer on
/// the whole `authenticated` router; the admin role is checked inside each admin handler.

/// Routes open to anonymous callers.
pub mod public;

/// Routes behind the `AuthUser` extractor middleware.
pub mod authenticated;

/// User management, authenticated and restricted to `ADMIN`.
pub mod admin;
