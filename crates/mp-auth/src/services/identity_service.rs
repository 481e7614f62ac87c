//! Identity resolution shared by both verifiers.
//!
//! After a token is verified, its (provider, subject) pair is mapped to a
//! local user, creating one on first sight, and the token is written to the
//! cache.

use crate::errors::StoreError;
use crate::models::{CachedToken, Identity, NewUser, Provider};
use crate::observability::metrics;
use crate::repositories::{IdentityStore, TokenStore};
use std::time::Duration;
use tracing::instrument;

/// Split a display name into (first, last).
///
/// Explicit first/last names win. Otherwise the full name is split on its
/// first whitespace; a name without whitespace is all first name.
pub fn split_full_name(full_name: &str, first_name: &str, last_name: &str) -> (String, String) {
    if !first_name.is_empty() || !last_name.is_empty() {
        return (first_name.to_string(), last_name.to_string());
    }

    let full_name = full_name.trim();
    match full_name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim_start().to_string()),
        None => (full_name.to_string(), String::new()),
    }
}

/// Find the identity for (provider, subject), creating user and association
/// if there is none.
///
/// A concurrent request may create the association between our read and our
/// insert; the resulting conflict is answered by reading the winner's row.
/// Returns the identity and whether it was created by this call.
#[instrument(skip_all, fields(issuer = %provider.iss))]
pub async fn resolve_identity<F>(
    identities: &dyn IdentityStore,
    provider: &Provider,
    subject: &str,
    new_user: F,
) -> Result<(Identity, bool), StoreError>
where
    F: FnOnce() -> NewUser,
{
    if let Some(identity) = identities.find_identity(provider, subject).await? {
        return Ok((identity, false));
    }

    match identities
        .create_identity(provider, subject, &new_user())
        .await
    {
        Ok(identity) => {
            tracing::info!(
                target: "mp_auth.identity",
                user_id = %identity.user.user_id,
                "Created user for new subject"
            );
            Ok((identity, true))
        }
        Err(StoreError::Conflict(reason)) => {
            tracing::debug!(
                target: "mp_auth.identity",
                reason = %reason,
                "Association created concurrently, reading existing"
            );
            identities
                .find_identity(provider, subject)
                .await?
                .map(|identity| (identity, false))
                .ok_or(StoreError::Conflict(reason))
        }
        Err(e) => Err(e),
    }
}

/// Like `resolve_identity`, also counting newly created users.
pub async fn resolve_identity_for(
    provider_kind: &'static str,
    identities: &dyn IdentityStore,
    provider: &Provider,
    subject: &str,
    new_user: impl FnOnce() -> NewUser,
) -> Result<Identity, StoreError> {
    let (identity, created) = resolve_identity(identities, provider, subject, new_user).await?;
    if created {
        metrics::record_user_created(provider_kind);
    }
    Ok(identity)
}

/// Expiry to cache a token under: its own `exp`, or `now + default_ttl`.
pub fn cache_expiry(exp: Option<i64>, now: i64, default_ttl: Duration) -> i64 {
    match exp {
        Some(exp) => exp,
        None => now.saturating_add(i64::try_from(default_ttl.as_secs()).unwrap_or(i64::MAX)),
    }
}

/// Write a freshly verified token to the cache.
pub async fn persist_token(
    tokens: &dyn TokenStore,
    access_token: &str,
    identity: &Identity,
    scope: Option<String>,
    exp: i64,
) -> Result<CachedToken, StoreError> {
    let token = CachedToken {
        access_token: access_token.to_string(),
        association_id: identity.association.association_id,
        scope,
        exp,
    };
    tokens.store(&token).await?;

    tracing::debug!(
        target: "mp_auth.cache",
        user_id = %identity.user.user_id,
        exp = exp,
        "Cached verified token"
    );
    Ok(token)
}
