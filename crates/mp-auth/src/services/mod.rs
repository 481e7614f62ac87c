//! Token verification services.
//!
//! Each verifier takes a raw token through its full pipeline: validation,
//! identity resolution, and cache write. `Authenticator` tries the cache
//! first and then the verifiers in order.

pub mod authenticator;
pub mod identity_service;
pub mod introspection_client;
pub mod jwks_client;
pub mod jwt_verifier;
pub mod opaque_verifier;

pub use authenticator::Authenticator;
pub use jwt_verifier::JwtVerifier;
pub use opaque_verifier::OpaqueTokenVerifier;

use crate::errors::AuthError;
use crate::models::Authenticated;
use async_trait::async_trait;

/// One way of turning a raw token into an identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Bounded label for logs and metrics (`jwt` or `opaque`).
    fn kind(&self) -> &'static str;

    /// Issuer strings whose tokens this verifier can vouch for.
    fn issuers(&self) -> Vec<String>;

    /// Verify `raw_token` and resolve its identity.
    ///
    /// On success the token has been written to the cache.
    async fn attempt(&self, raw_token: &str) -> Result<Authenticated, AuthError>;
}
