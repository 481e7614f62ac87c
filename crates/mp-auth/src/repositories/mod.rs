//! Storage abstractions.
//!
//! Three narrow traits cover everything authentication persists:
//! - `TokenStore` - verified tokens, keyed by the raw token string
//! - `KeyStore` - JWKS keys, keyed by (provider, kid)
//! - `IdentityStore` - providers, users, and user associations
//!
//! `MemoryStore` implements all three for tests and single-node setups;
//! `PgStore` implements them on Postgres.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::errors::StoreError;
use crate::models::{
    CachedToken, Identity, NewSigningKey, NewUser, Provider, SigningKey,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Cache of previously verified tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find a usable cache entry for `access_token`.
    ///
    /// Returns `None` when there is no entry, the entry has expired, or its
    /// identity's issuer is not in `acceptable_issuers`.
    async fn lookup(
        &self,
        access_token: &str,
        acceptable_issuers: &HashSet<String>,
    ) -> Result<Option<(Identity, CachedToken)>, StoreError>;

    /// Insert or replace the entry for `token.access_token`.
    async fn store(&self, token: &CachedToken) -> Result<(), StoreError>;

    /// Delete every entry whose `exp` is before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// Persisted JWKS keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert or update the key identified by (provider, kid).
    async fn upsert_key(
        &self,
        provider: &Provider,
        key: &NewSigningKey,
    ) -> Result<SigningKey, StoreError>;

    async fn get_key(
        &self,
        provider: &Provider,
        kid: &str,
    ) -> Result<Option<SigningKey>, StoreError>;

    /// Every stored key with this kid, across all providers.
    async fn find_keys_by_kid(&self, kid: &str) -> Result<Vec<SigningKey>, StoreError>;
}

/// Providers, users, and their associations.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the provider with this issuer string, creating it if absent.
    async fn get_or_create_provider(&self, iss: &str) -> Result<Provider, StoreError>;

    async fn find_identity(
        &self,
        provider: &Provider,
        subject: &str,
    ) -> Result<Option<Identity>, StoreError>;

    /// Create a user and its association to (provider, subject) atomically.
    ///
    /// Returns `StoreError::Conflict` when the association already exists.
    async fn create_identity(
        &self,
        provider: &Provider,
        subject: &str,
        user: &NewUser,
    ) -> Result<Identity, StoreError>;
}

/// Handles to the three stores, usually all backed by one object.
#[derive(Clone)]
pub struct Stores {
    pub tokens: Arc<dyn TokenStore>,
    pub keys: Arc<dyn KeyStore>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Stores {
    /// Use one store for all three roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: TokenStore + KeyStore + IdentityStore + 'static,
    {
        Self {
            tokens: store.clone(),
            keys: store.clone(),
            identities: store,
        }
    }
}

/// Whether a cache entry may be served for a request at `now`.
///
/// Shared by every `TokenStore` so they agree on the rule.
pub(crate) fn is_cache_hit(
    identity: &Identity,
    token: &CachedToken,
    acceptable_issuers: &HashSet<String>,
    now: i64,
) -> bool {
    if token.exp < now {
        tracing::debug!(target: "mp_auth.cache", exp = token.exp, "Cached token expired");
        return false;
    }
    if !acceptable_issuers.contains(&identity.provider.iss) {
        tracing::debug!(
            target: "mp_auth.cache",
            issuer = %identity.provider.iss,
            "Cached token issued by a provider not accepted here"
        );
        return false;
    }
    true
}
