//! In-memory implementation of every store trait.

use super::{is_cache_hit, IdentityStore, KeyStore, TokenStore};
use crate::errors::StoreError;
use crate::models::{
    CachedToken, Identity, NewSigningKey, NewUser, Provider, SigningKey, User, UserAssociation,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    /// Keyed by `iss`.
    providers: HashMap<String, Provider>,
    /// Keyed by (provider_id, kid).
    keys: HashMap<(Uuid, String), SigningKey>,
    users: HashMap<Uuid, User>,
    associations: HashMap<Uuid, UserAssociation>,
    /// (provider_id, subject) -> association_id
    subjects: HashMap<(Uuid, String), Uuid>,
    /// Keyed by the raw token.
    tokens: HashMap<String, CachedToken>,
}

impl Tables {
    fn identity(&self, association_id: Uuid) -> Option<Identity> {
        let association = self.associations.get(&association_id)?;
        let user = self.users.get(&association.user_id)?;
        let provider = self
            .providers
            .values()
            .find(|p| p.provider_id == association.provider_id)?;

        Some(Identity {
            user: user.clone(),
            association: association.clone(),
            provider: provider.clone(),
        })
    }
}

/// Row counts, for asserting what an operation wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub providers: usize,
    pub keys: usize,
    pub users: usize,
    pub associations: usize,
    pub tokens: usize,
}

/// Thread-safe in-memory store.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn counts(&self) -> StoreCounts {
        let tables = self.tables.read().await;
        StoreCounts {
            providers: tables.providers.len(),
            keys: tables.keys.len(),
            users: tables.users.len(),
            associations: tables.associations.len(),
            tokens: tables.tokens.len(),
        }
    }

    /// Stored entry for `access_token`, ignoring expiry and issuer scoping.
    pub async fn cached_token(&self, access_token: &str) -> Option<CachedToken> {
        self.tables.read().await.tokens.get(access_token).cloned()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn lookup(
        &self,
        access_token: &str,
        acceptable_issuers: &HashSet<String>,
    ) -> Result<Option<(Identity, CachedToken)>, StoreError> {
        let tables = self.tables.read().await;
        let Some(token) = tables.tokens.get(access_token) else {
            return Ok(None);
        };
        let Some(identity) = tables.identity(token.association_id) else {
            return Ok(None);
        };

        if is_cache_hit(&identity, token, acceptable_issuers, Utc::now().timestamp()) {
            Ok(Some((identity, token.clone())))
        } else {
            Ok(None)
        }
    }

    async fn store(&self, token: &CachedToken) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.associations.contains_key(&token.association_id) {
            return Err(StoreError::Database(format!(
                "Unknown user association {}",
                token.association_id
            )));
        }
        tables
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, token| token.exp >= now);
        Ok((before - tables.tokens.len()) as u64)
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn upsert_key(
        &self,
        provider: &Provider,
        key: &NewSigningKey,
    ) -> Result<SigningKey, StoreError> {
        let stored = SigningKey {
            provider_id: provider.provider_id,
            kid: key.kid.clone(),
            kty: key.kty.clone(),
            alg: key.alg.clone(),
            x5c: key.x5c.clone(),
            n: key.n.clone(),
            e: key.e.clone(),
        };

        let mut tables = self.tables.write().await;
        tables
            .keys
            .insert((provider.provider_id, key.kid.clone()), stored.clone());
        Ok(stored)
    }

    async fn get_key(
        &self,
        provider: &Provider,
        kid: &str,
    ) -> Result<Option<SigningKey>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .keys
            .get(&(provider.provider_id, kid.to_string()))
            .cloned())
    }

    async fn find_keys_by_kid(&self, kid: &str) -> Result<Vec<SigningKey>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .keys
            .values()
            .filter(|key| key.kid == kid)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn get_or_create_provider(&self, iss: &str) -> Result<Provider, StoreError> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .entry(iss.to_string())
            .or_insert_with(|| Provider {
                provider_id: Uuid::new_v4(),
                iss: iss.to_string(),
            });
        Ok(provider.clone())
    }

    async fn find_identity(
        &self,
        provider: &Provider,
        subject: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subjects
            .get(&(provider.provider_id, subject.to_string()))
            .and_then(|association_id| tables.identity(*association_id)))
    }

    async fn create_identity(
        &self,
        provider: &Provider,
        subject: &str,
        user: &NewUser,
    ) -> Result<Identity, StoreError> {
        let mut tables = self.tables.write().await;
        let subject_key = (provider.provider_id, subject.to_string());
        if tables.subjects.contains_key(&subject_key) {
            return Err(StoreError::Conflict(format!(
                "Association for subject already exists at provider {}",
                provider.iss
            )));
        }

        let user = User {
            user_id: Uuid::new_v4(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        };
        let association = UserAssociation {
            association_id: Uuid::new_v4(),
            user_id: user.user_id,
            provider_id: provider.provider_id,
            subject: subject.to_string(),
        };

        tables.users.insert(user.user_id, user.clone());
        tables
            .associations
            .insert(association.association_id, association.clone());
        tables
            .subjects
            .insert(subject_key, association.association_id);

        Ok(Identity {
            user,
            association,
            provider: provider.clone(),
        })
    }
}
