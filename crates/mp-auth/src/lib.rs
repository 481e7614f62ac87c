//! Multi-provider bearer-token authentication.
//!
//! Accepts RS256 JWTs from configured issuers and opaque tokens from
//! configured RFC 7662 introspection providers, maps each token's subject to
//! a local user, and caches verified tokens until they expire.
//!
//! # Modules
//!
//! - `bearer` - `Authorization` header parsing
//! - `config` - Provider and server configuration
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Axum authentication middleware
//! - `models` - Data models
//! - `observability` - Metrics
//! - `repositories` - Storage traits, in-memory and Postgres stores
//! - `routes` - Router and application state
//! - `services` - Verifiers and the authentication orchestrator
//! - `tasks` - Background maintenance tasks

pub mod bearer;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;

pub use bearer::extract_bearer_token;
pub use config::{AuthConfig, ServerConfig};
pub use errors::{AuthError, StoreError};
pub use models::Authenticated;
pub use services::Authenticator;
