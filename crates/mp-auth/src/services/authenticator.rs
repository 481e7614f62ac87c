//! Authentication orchestrator.
//!
//! Serves cached tokens first, then tries the JWT verifier (if any issuers
//! are configured) followed by each opaque-token provider in configuration
//! order. The first success wins. If every verifier rejects the token, their
//! reasons are joined into one `AuthError::Aggregate`.
//!
//! Storage failures are not rejections: they abort immediately so that a
//! database outage is never reported as a bad token.

use super::{JwtVerifier, OpaqueTokenVerifier, TokenVerifier};
use crate::bearer::extract_bearer_token;
use crate::config::{AuthConfig, ConfigError};
use crate::errors::AuthError;
use crate::models::Authenticated;
use crate::observability::metrics;
use crate::repositories::{Stores, TokenStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Separator between the per-verifier reasons of an aggregate failure.
pub const AGGREGATE_SEPARATOR: &str = ". Or: ";

pub struct Authenticator {
    tokens: Arc<dyn TokenStore>,
    verifiers: Vec<Arc<dyn TokenVerifier>>,
    accepted_issuers: HashSet<String>,
}

impl Authenticator {
    /// Build from explicit verifiers, tried in the given order.
    pub fn new(tokens: Arc<dyn TokenStore>, verifiers: Vec<Arc<dyn TokenVerifier>>) -> Self {
        let accepted_issuers = verifiers
            .iter()
            .flat_map(|verifier| verifier.issuers())
            .collect();

        Self {
            tokens,
            verifiers,
            accepted_issuers,
        }
    }

    /// Build the verifier chain described by `config`.
    pub fn from_config(config: &AuthConfig, stores: Stores) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut verifiers: Vec<Arc<dyn TokenVerifier>> = Vec::new();
        if !config.jwt_issuers.is_empty() {
            verifiers.push(Arc::new(JwtVerifier::new(config, stores.clone())));
        }
        for provider in &config.opaque_providers {
            verifiers.push(Arc::new(OpaqueTokenVerifier::new(
                provider,
                config.default_cache_ttl(),
                config.http_timeout(),
                stores.clone(),
            )?));
        }

        tracing::info!(
            target: "mp_auth.authenticator",
            jwt_issuers = config.jwt_issuers.len(),
            opaque_providers = config.opaque_providers.len(),
            "Authenticator configured"
        );
        Ok(Self::new(stores.tokens, verifiers))
    }

    pub fn accepted_issuers(&self) -> &HashSet<String> {
        &self.accepted_issuers
    }

    /// Authenticate the value of an `Authorization` header.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        let token = extract_bearer_token(authorization)?;
        self.authenticate_token(token).await
    }

    /// Authenticate a raw bearer token.
    #[instrument(skip_all, name = "mp_auth.authenticate")]
    pub async fn authenticate_token(&self, raw_token: &str) -> Result<Authenticated, AuthError> {
        let start = Instant::now();
        let result = self.run(raw_token).await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_authentication(status, start.elapsed());
        result
    }

    async fn run(&self, raw_token: &str) -> Result<Authenticated, AuthError> {
        let cached = self.tokens.lookup(raw_token, &self.accepted_issuers).await?;
        metrics::record_cache_lookup(cached.is_some());
        if let Some((identity, token)) = cached {
            tracing::info!(
                target: "mp_auth.authenticator",
                user_id = %identity.user.user_id,
                issuer = %identity.provider.iss,
                "Authenticated from token cache"
            );
            return Ok(Authenticated { identity, token });
        }

        let mut failures: Vec<String> = Vec::new();
        for verifier in &self.verifiers {
            match verifier.attempt(raw_token).await {
                Ok(authenticated) => {
                    metrics::record_verification(verifier.kind(), "success", None);
                    return Ok(authenticated);
                }
                Err(e) if e.is_storage() => {
                    metrics::record_verification(verifier.kind(), "error", Some(e.category()));
                    tracing::error!(
                        target: "mp_auth.authenticator",
                        verifier = verifier.kind(),
                        error = %e,
                        "Storage failure, aborting authentication"
                    );
                    return Err(e);
                }
                Err(e) => {
                    metrics::record_verification(verifier.kind(), "error", Some(e.category()));
                    tracing::debug!(
                        target: "mp_auth.authenticator",
                        verifier = verifier.kind(),
                        error = %e,
                        "Verifier rejected token"
                    );
                    failures.push(e.to_string());
                }
            }
        }

        tracing::info!(
            target: "mp_auth.authenticator",
            attempts = failures.len(),
            "Authentication failed"
        );
        Err(AuthError::Aggregate(failures.join(AGGREGATE_SEPARATOR)))
    }
}
