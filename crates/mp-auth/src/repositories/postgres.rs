//! Postgres implementation of the store traits.
//!
//! Schema lives in `migrations/` at the workspace root. Cached tokens are
//! keyed by the SHA-256 of the raw token so bearer credentials never sit in
//! the database.

use super::{is_cache_hit, IdentityStore, KeyStore, TokenStore};
use crate::errors::StoreError;
use crate::models::{
    CachedToken, Identity, NewSigningKey, NewUser, Provider, SigningKey, User, UserAssociation,
};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn token_hash(access_token: &str) -> Vec<u8> {
    Sha256::digest(access_token.as_bytes()).to_vec()
}

/// Wrap a sqlx error with what was being attempted, keeping unique
/// violations distinguishable.
fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match StoreError::from(e) {
        StoreError::Conflict(msg) => StoreError::Conflict(format!("{}: {}", context, msg)),
        StoreError::Database(msg) => StoreError::Database(format!("{}: {}", context, msg)),
    }
}

/// A user, its association, and the provider, in one joined row.
#[derive(sqlx::FromRow)]
struct IdentityRow {
    user_id: Uuid,
    username: String,
    email: Option<String>,
    first_name: String,
    last_name: String,
    association_id: Uuid,
    subject: String,
    provider_id: Uuid,
    iss: String,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Identity {
            user: User {
                user_id: row.user_id,
                username: row.username,
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
            },
            association: UserAssociation {
                association_id: row.association_id,
                user_id: row.user_id,
                provider_id: row.provider_id,
                subject: row.subject,
            },
            provider: Provider {
                provider_id: row.provider_id,
                iss: row.iss,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct CachedTokenRow {
    #[sqlx(flatten)]
    identity: IdentityRow,
    scope: Option<String>,
    exp: i64,
}

#[async_trait]
impl TokenStore for PgStore {
    async fn lookup(
        &self,
        access_token: &str,
        acceptable_issuers: &HashSet<String>,
    ) -> Result<Option<(Identity, CachedToken)>, StoreError> {
        let row = sqlx::query_as::<_, CachedTokenRow>(
            r#"
            SELECT
                u.user_id, u.username, u.email, u.first_name, u.last_name,
                a.association_id, a.subject, p.provider_id, p.iss,
                t.scope, t.exp
            FROM access_tokens t
            JOIN user_associations a ON a.association_id = t.association_id
            JOIN users u ON u.user_id = a.user_id
            JOIN providers p ON p.provider_id = a.provider_id
            WHERE t.token_hash = $1
            "#,
        )
        .bind(token_hash(access_token))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to look up cached token"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let identity = Identity::from(row.identity);
        let token = CachedToken {
            access_token: access_token.to_string(),
            association_id: identity.association.association_id,
            scope: row.scope,
            exp: row.exp,
        };

        if is_cache_hit(&identity, &token, acceptable_issuers, Utc::now().timestamp()) {
            Ok(Some((identity, token)))
        } else {
            Ok(None)
        }
    }

    async fn store(&self, token: &CachedToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (token_hash, association_id, scope, exp)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_hash) DO UPDATE
            SET association_id = EXCLUDED.association_id,
                scope = EXCLUDED.scope,
                exp = EXCLUDED.exp,
                updated_at = NOW()
            "#,
        )
        .bind(token_hash(&token.access_token))
        .bind(token.association_id)
        .bind(&token.scope)
        .bind(token.exp)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store cached token"))?;

        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE exp < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to purge expired tokens"))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KeyStore for PgStore {
    async fn upsert_key(
        &self,
        provider: &Provider,
        key: &NewSigningKey,
    ) -> Result<SigningKey, StoreError> {
        let stored = sqlx::query_as::<_, SigningKey>(
            r#"
            INSERT INTO signing_keys (signing_key_id, provider_id, kid, kty, alg, x5c, n, e)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider_id, kid) DO UPDATE
            SET kty = EXCLUDED.kty,
                alg = EXCLUDED.alg,
                x5c = EXCLUDED.x5c,
                n = EXCLUDED.n,
                e = EXCLUDED.e,
                updated_at = NOW()
            RETURNING provider_id, kid, kty, alg, x5c, n, e
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider.provider_id)
        .bind(&key.kid)
        .bind(&key.kty)
        .bind(&key.alg)
        .bind(&key.x5c)
        .bind(&key.n)
        .bind(&key.e)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to upsert signing key"))?;

        Ok(stored)
    }

    async fn get_key(
        &self,
        provider: &Provider,
        kid: &str,
    ) -> Result<Option<SigningKey>, StoreError> {
        let key = sqlx::query_as::<_, SigningKey>(
            r#"
            SELECT provider_id, kid, kty, alg, x5c, n, e
            FROM signing_keys
            WHERE provider_id = $1 AND kid = $2
            "#,
        )
        .bind(provider.provider_id)
        .bind(kid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch signing key"))?;

        Ok(key)
    }

    async fn find_keys_by_kid(&self, kid: &str) -> Result<Vec<SigningKey>, StoreError> {
        let keys = sqlx::query_as::<_, SigningKey>(
            r#"
            SELECT provider_id, kid, kty, alg, x5c, n, e
            FROM signing_keys
            WHERE kid = $1
            "#,
        )
        .bind(kid)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to fetch signing keys by kid"))?;

        Ok(keys)
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn get_or_create_provider(&self, iss: &str) -> Result<Provider, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO providers (provider_id, iss)
            VALUES ($1, $2)
            ON CONFLICT (iss) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(iss)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create provider"))?;

        let provider = sqlx::query_as::<_, Provider>(
            r#"
            SELECT provider_id, iss
            FROM providers
            WHERE iss = $1
            "#,
        )
        .bind(iss)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to fetch provider"))?;

        Ok(provider)
    }

    async fn find_identity(
        &self,
        provider: &Provider,
        subject: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT
                u.user_id, u.username, u.email, u.first_name, u.last_name,
                a.association_id, a.subject, p.provider_id, p.iss
            FROM user_associations a
            JOIN users u ON u.user_id = a.user_id
            JOIN providers p ON p.provider_id = a.provider_id
            WHERE a.provider_id = $1 AND a.subject = $2
            "#,
        )
        .bind(provider.provider_id)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to fetch identity"))?;

        Ok(row.map(Identity::from))
    }

    async fn create_identity(
        &self,
        provider: &Provider,
        subject: &str,
        user: &NewUser,
    ) -> Result<Identity, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, username, email, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, username, email, first_name, last_name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to create user"))?;

        // A unique violation here rolls back the user insert when `tx` drops.
        let association = sqlx::query_as::<_, UserAssociation>(
            r#"
            INSERT INTO user_associations (association_id, user_id, provider_id, subject)
            VALUES ($1, $2, $3, $4)
            RETURNING association_id, user_id, provider_id, subject
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(provider.provider_id)
        .bind(subject)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to create user association"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit identity"))?;

        Ok(Identity {
            user,
            association,
            provider: provider.clone(),
        })
    }
}
