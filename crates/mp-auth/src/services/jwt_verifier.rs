//! Signed-token (JWT) verifier.
//!
//! Validates RS256 JWTs from the configured issuers against keys downloaded
//! from each issuer's JWKS endpoint and persisted in the `KeyStore`.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; the header cannot negotiate another algorithm
//! - Claims are checked before any network or storage access
//! - A key is only used for the issuer that published it

use super::identity_service::{cache_expiry, persist_token, resolve_identity_for};
use super::jwks_client::JwksClient;
use super::TokenVerifier;
use crate::config::{AuthConfig, JwtIssuerConfig, KeyRefresh};
use crate::errors::AuthError;
use crate::models::{Authenticated, NewUser, Provider, SigningKey};
use crate::repositories::Stores;
use async_trait::async_trait;
use chrono::Utc;
use common::jwt::{decode_unverified, x5c_to_pem, JWT_TYPE, RS256};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::instrument;

/// Claims that passed every check that does not need a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedClaims {
    pub issuer: String,
    pub audience: String,
    pub subject: String,
    pub exp: Option<i64>,
    pub kid: Option<String>,
    pub jwks_url: String,
}

/// Verifier for every configured JWT issuer.
pub struct JwtVerifier {
    issuers: HashMap<String, JwtIssuerConfig>,
    key_refresh: KeyRefresh,
    default_cache_ttl: Duration,
    jwks_client: JwksClient,
    stores: Stores,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig, stores: Stores) -> Self {
        Self {
            issuers: config.jwt_issuers.clone(),
            key_refresh: config.key_refresh,
            default_cache_ttl: config.default_cache_ttl(),
            jwks_client: JwksClient::new(config.http_timeout()),
            stores,
        }
    }

    /// Run the key-independent checks against `raw_token` at time `now`.
    ///
    /// Order matters: parse, header, issuer, audience, subject, then
    /// lifetime. The first failure wins.
    pub fn check_claims(&self, raw_token: &str, now: i64) -> Result<CheckedClaims, AuthError> {
        let token = decode_unverified(raw_token).map_err(|e| {
            tracing::debug!(target: "mp_auth.jwt", error = %e, "Token parse failed");
            AuthError::TokenMalformed(e.to_string())
        })?;

        if token.header.typ.as_deref() != Some(JWT_TYPE) {
            return Err(AuthError::UnsupportedTokenFormat(
                "Unsupported JWT token type".to_string(),
            ));
        }
        if token.header.alg.as_deref() != Some(RS256) {
            return Err(AuthError::UnsupportedTokenFormat(
                "Unsupported JWT token algorithm".to_string(),
            ));
        }

        let issuer = token.string_claim("iss").unwrap_or_default();
        let Some(issuer_config) = self.issuers.get(issuer) else {
            tracing::debug!(target: "mp_auth.jwt", issuer = %issuer, "Token from untrusted issuer");
            return Err(AuthError::UntrustedIssuer);
        };

        if token.string_claim("aud") != Some(issuer_config.audience.as_str()) {
            return Err(AuthError::AudienceMismatch);
        }

        let subject = match token.string_claim("sub") {
            Some(sub) if !sub.is_empty() => sub.to_string(),
            _ => return Err(AuthError::MissingSubject),
        };

        let exp = token
            .timestamp_claim("exp")
            .map_err(|e| AuthError::TokenMalformed(e.to_string()))?;
        if exp.is_some_and(|exp| exp < now) {
            return Err(AuthError::TokenExpired);
        }

        let nbf = token
            .timestamp_claim("nbf")
            .map_err(|e| AuthError::TokenMalformed(e.to_string()))?;
        if let Some(nbf) = nbf.filter(|nbf| *nbf > now) {
            return Err(AuthError::TokenNotYetValid(nbf));
        }

        Ok(CheckedClaims {
            issuer: issuer.to_string(),
            audience: issuer_config.audience.clone(),
            subject,
            exp,
            kid: token.header.kid.clone(),
            jwks_url: issuer_config.jwks_url_for(issuer),
        })
    }

    /// Download the issuer's JWKS and upsert every usable key.
    ///
    /// Download, parse and per-key storage failures only log; verification
    /// continues with whatever keys are already stored.
    async fn refresh_keys(&self, provider: &Provider, jwks_url: &str) {
        let keys = match self.jwks_client.fetch_keys(jwks_url).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(
                    target: "mp_auth.jwks",
                    issuer = %provider.iss,
                    error = %e,
                    "Could not download JWKS, using stored keys"
                );
                return;
            }
        };

        for key in &keys {
            if let Err(e) = self.stores.keys.upsert_key(provider, key).await {
                tracing::warn!(
                    target: "mp_auth.jwks",
                    issuer = %provider.iss,
                    kid = %key.kid,
                    error = %e,
                    "Could not store JWKS key, skipping"
                );
            }
        }
    }

    /// Find the stored key for the token's kid, refreshing per `key_refresh`.
    async fn resolve_key(
        &self,
        provider: &Provider,
        claims: &CheckedClaims,
    ) -> Result<SigningKey, AuthError> {
        let Some(kid) = claims.kid.as_deref().filter(|kid| !kid.is_empty()) else {
            tracing::debug!(target: "mp_auth.jwt", "Token header has no kid");
            return Err(AuthError::KeyResolutionFailed);
        };

        let fetch = match self.key_refresh {
            KeyRefresh::Always => true,
            KeyRefresh::OnMiss => self.stores.keys.get_key(provider, kid).await?.is_none(),
        };
        if fetch {
            self.refresh_keys(provider, &claims.jwks_url).await;
        }

        let candidates = self.stores.keys.find_keys_by_kid(kid).await?;
        let published_elsewhere = !candidates.is_empty();
        match candidates
            .into_iter()
            .find(|key| key.provider_id == provider.provider_id)
        {
            Some(key) => Ok(key),
            None => {
                if published_elsewhere {
                    tracing::warn!(
                        target: "mp_auth.jwt",
                        issuer = %provider.iss,
                        kid = %kid,
                        "Key id belongs to a different issuer"
                    );
                } else {
                    tracing::debug!(
                        target: "mp_auth.jwt",
                        issuer = %provider.iss,
                        kid = %kid,
                        "Key id not found"
                    );
                }
                Err(AuthError::KeyResolutionFailed)
            }
        }
    }
}

/// Build a decoding key from stored key material: the `x5c` certificate
/// when present, otherwise the RSA components.
pub fn decoding_key(key: &SigningKey) -> Result<DecodingKey, AuthError> {
    if let Some(x5c) = &key.x5c {
        match DecodingKey::from_rsa_pem(x5c_to_pem(x5c).as_bytes()) {
            Ok(decoding_key) => return Ok(decoding_key),
            Err(e) => {
                tracing::warn!(
                    target: "mp_auth.jwt",
                    kid = %key.kid,
                    error = %e,
                    "Unusable x5c certificate"
                );
            }
        }
    }

    if let (Some(n), Some(e)) = (&key.n, &key.e) {
        return DecodingKey::from_rsa_components(n, e).map_err(|err| {
            tracing::warn!(
                target: "mp_auth.jwt",
                kid = %key.kid,
                error = %err,
                "Unusable RSA components"
            );
            AuthError::SignatureInvalid("unusable signing key".to_string())
        });
    }

    Err(AuthError::SignatureInvalid("unusable signing key".to_string()))
}

/// Verify the RS256 signature, re-checking audience and lifetime.
pub fn verify_signature(
    raw_token: &str,
    key: &SigningKey,
    audience: &str,
) -> Result<(), AuthError> {
    if !key.kty.is_empty() && key.kty != "RSA" {
        return Err(AuthError::SignatureInvalid(format!(
            "signing key type {} is not RSA",
            key.kty
        )));
    }
    if let Some(alg) = key.alg.as_deref().filter(|alg| *alg != RS256) {
        return Err(AuthError::SignatureInvalid(format!(
            "signing key algorithm {} is not RS256",
            alg
        )));
    }

    let decoding_key = decoding_key(key)?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    validation.leeway = 0;
    validation.validate_nbf = true;
    // `exp` is optional; when present it is still enforced.
    validation.required_spec_claims = HashSet::new();

    decode::<serde_json::Value>(raw_token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "mp_auth.jwt", error = %e, "Signature verification failed");
        AuthError::SignatureInvalid(e.to_string())
    })?;

    Ok(())
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    fn kind(&self) -> &'static str {
        "jwt"
    }

    fn issuers(&self) -> Vec<String> {
        self.issuers.keys().cloned().collect()
    }

    #[instrument(skip_all, name = "mp_auth.jwt.attempt")]
    async fn attempt(&self, raw_token: &str) -> Result<Authenticated, AuthError> {
        let now = Utc::now().timestamp();
        let claims = self.check_claims(raw_token, now)?;

        let provider = self
            .stores
            .identities
            .get_or_create_provider(&claims.issuer)
            .await?;
        let key = self.resolve_key(&provider, &claims).await?;
        verify_signature(raw_token, &key, &claims.audience)?;

        let identity = resolve_identity_for(
            self.kind(),
            self.stores.identities.as_ref(),
            &provider,
            &claims.subject,
            || NewUser::from_subject(&claims.subject),
        )
        .await?;

        let exp = cache_expiry(claims.exp, now, self.default_cache_ttl);
        let token = persist_token(
            self.stores.tokens.as_ref(),
            raw_token,
            &identity,
            None,
            exp,
        )
        .await?;

        tracing::info!(
            target: "mp_auth.jwt",
            issuer = %provider.iss,
            user_id = %identity.user.user_id,
            "JWT verified"
        );
        Ok(Authenticated { identity, token })
    }
}
