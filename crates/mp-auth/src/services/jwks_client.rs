//! JWKS client for downloading an issuer's published signing keys.
//!
//! Each key entry is parsed on its own: entries without a `kid`, or with
//! neither an `x5c` certificate nor RSA `n`/`e` components, are skipped and
//! the rest of the document is still used.

use crate::models::NewSigningKey;
use crate::observability::metrics;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("JWKS request failed: {0}")]
    Request(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("Invalid JWKS document: {0}")]
    InvalidDocument(String),
}

/// JSON Web Key as published by an issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub kty: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    /// Certificate chain; only the first (leaf) entry is used.
    #[serde(default)]
    pub x5c: Option<Vec<String>>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Convert to storable key material, or `None` if the entry is unusable.
    pub fn into_signing_key(self) -> Option<NewSigningKey> {
        let kid = self.kid.filter(|kid| !kid.is_empty())?;
        let x5c = self
            .x5c
            .and_then(|chain| chain.into_iter().next())
            .filter(|cert| !cert.is_empty());
        let (n, e) = match (self.n, self.e) {
            (Some(n), Some(e)) if !n.is_empty() && !e.is_empty() => (Some(n), Some(e)),
            _ => (None, None),
        };

        if x5c.is_none() && n.is_none() {
            return None;
        }

        Some(NewSigningKey {
            kid,
            kty: self.kty.unwrap_or_default(),
            alg: self.alg,
            x5c,
            n,
            e,
        })
    }
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

/// Parse a JWKS body, keeping every usable key.
pub fn parse_jwks(body: &[u8]) -> Result<Vec<NewSigningKey>, JwksError> {
    let document: JwksDocument =
        serde_json::from_slice(body).map_err(|e| JwksError::InvalidDocument(e.to_string()))?;

    let total = document.keys.len();
    let keys: Vec<NewSigningKey> = document
        .keys
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<Jwk>(entry).ok())
        .filter_map(Jwk::into_signing_key)
        .collect();

    if keys.len() < total {
        tracing::debug!(
            target: "mp_auth.jwks",
            skipped = total - keys.len(),
            "Skipped unusable JWKS entries"
        );
    }

    Ok(keys)
}

/// HTTP client for JWKS endpoints.
#[derive(Clone)]
pub struct JwksClient {
    http_client: reqwest::Client,
}

impl JwksClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    target: "mp_auth.jwks",
                    error = %e,
                    "Failed to build HTTP client with custom config, using defaults"
                );
                reqwest::Client::new()
            });

        Self { http_client }
    }

    /// Download and parse the key set at `jwks_url`.
    ///
    /// # Errors
    ///
    /// Returns `JwksError` on transport failure, a non-success status, or a
    /// body that is not a JWKS document. Callers treat all of these as "no
    /// new keys".
    #[instrument(skip(self), fields(url = %jwks_url))]
    pub async fn fetch_keys(&self, jwks_url: &str) -> Result<Vec<NewSigningKey>, JwksError> {
        let result = self.fetch(jwks_url).await;
        metrics::record_jwks_fetch(if result.is_ok() { "success" } else { "error" });
        result
    }

    async fn fetch(&self, jwks_url: &str) -> Result<Vec<NewSigningKey>, JwksError> {
        tracing::debug!(target: "mp_auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::Request(e.to_string()))?;

        let keys = parse_jwks(&body)?;
        tracing::debug!(target: "mp_auth.jwks", key_count = keys.len(), "JWKS fetched");
        Ok(keys)
    }
}
