//! Router Module Index
//!
//! Splits `/api/v1` by access: `public` needs no token, `authenticated` and `admin`
//! are wrapped in the `AuthUser` layer by `create_router`.

/// Login and token refresh.
pub mod public;

/// Session, achievement, student and lecturer routes.
pub mod authenticated;

/// User and profile management.
pub mod admin;
