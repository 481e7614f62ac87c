//! HTTP middleware.
//!
//! - `auth` - Bearer authentication for protected routes

pub mod auth;

pub use auth::require_auth;
