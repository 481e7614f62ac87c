//! Opaque-token verifier backed by RFC 7662 introspection.
//!
//! One instance per configured provider. Users are stored under the
//! provider's configured name, which plays the role of an issuer.

use super::identity_service::{cache_expiry, persist_token, resolve_identity_for, split_full_name};
use super::introspection_client::{IntrospectionClient, IntrospectionResponse};
use super::TokenVerifier;
use crate::config::{ConfigError, OpaqueProviderConfig};
use crate::errors::AuthError;
use crate::models::{Authenticated, NewUser};
use crate::repositories::Stores;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::instrument;

pub struct OpaqueTokenVerifier {
    name: String,
    audience: Option<String>,
    scope: Option<String>,
    default_cache_ttl: Duration,
    client: IntrospectionClient,
    stores: Stores,
}

impl OpaqueTokenVerifier {
    pub fn new(
        provider: &OpaqueProviderConfig,
        default_cache_ttl: Duration,
        http_timeout: Duration,
        stores: Stores,
    ) -> Result<Self, ConfigError> {
        let endpoint = provider.introspection_endpoint().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "opaque provider {} needs an introspection_url",
                provider.name
            ))
        })?;

        Ok(Self {
            name: provider.name.clone(),
            audience: provider.audience.clone(),
            scope: provider.scope.clone(),
            default_cache_ttl,
            client: IntrospectionClient::new(
                endpoint.to_string(),
                provider.client_id.clone(),
                provider.client_secret.clone(),
                http_timeout,
            ),
            stores,
        })
    }

    /// Validate an introspection response at time `now`, returning the
    /// subject.
    ///
    /// Checks run in order: active, lifetime, audience, scope, subject.
    /// A response that names an audience is rejected unless the provider is
    /// configured with that audience.
    pub fn check_response(
        &self,
        response: &IntrospectionResponse,
        now: i64,
    ) -> Result<String, AuthError> {
        if !response.active {
            return Err(AuthError::TokenNotActive);
        }
        if response.exp.is_some_and(|exp| exp < now) {
            return Err(AuthError::TokenExpired);
        }
        if let Some(nbf) = response.nbf.filter(|nbf| *nbf > now) {
            return Err(AuthError::TokenNotYetValid(nbf));
        }

        if let Some(audiences) = &response.aud {
            match &self.audience {
                Some(expected) if audiences.iter().any(|aud| aud == expected) => {}
                _ => return Err(AuthError::AudienceMismatch),
            }
        }

        if let (Some(_), Some(expected)) = (&response.scope, &self.scope) {
            if !response.has_scope(expected) {
                return Err(AuthError::ScopeMismatch);
            }
        }

        response
            .sub
            .clone()
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::InvalidIntrospectionResponse)
    }
}

/// Profile for a user first seen through introspection.
fn new_user_from(response: &IntrospectionResponse, subject: &str) -> NewUser {
    let (first_name, last_name) =
        split_full_name(response.name.as_deref().unwrap_or_default(), "", "");

    NewUser {
        username: response
            .username
            .clone()
            .filter(|username| !username.is_empty())
            .unwrap_or_else(|| subject.to_string()),
        email: response.email.clone(),
        first_name,
        last_name,
    }
}

#[async_trait]
impl TokenVerifier for OpaqueTokenVerifier {
    fn kind(&self) -> &'static str {
        "opaque"
    }

    fn issuers(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    #[instrument(skip_all, name = "mp_auth.opaque.attempt", fields(provider = %self.name))]
    async fn attempt(&self, raw_token: &str) -> Result<Authenticated, AuthError> {
        let response = self.client.introspect(raw_token).await?;
        let now = Utc::now().timestamp();
        let subject = self.check_response(&response, now)?;

        let provider = self
            .stores
            .identities
            .get_or_create_provider(&self.name)
            .await?;

        let identity = resolve_identity_for(
            self.kind(),
            self.stores.identities.as_ref(),
            &provider,
            &subject,
            || new_user_from(&response, &subject),
        )
        .await?;

        let exp = cache_expiry(response.exp, now, self.default_cache_ttl);
        let token = persist_token(
            self.stores.tokens.as_ref(),
            raw_token,
            &identity,
            response.scope.clone(),
            exp,
        )
        .await?;

        tracing::info!(
            target: "mp_auth.introspection",
            provider = %self.name,
            user_id = %identity.user.user_id,
            "Opaque token verified"
        );
        Ok(Authenticated { identity, token })
    }
}
