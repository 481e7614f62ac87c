//! RFC 7662 token introspection client.
//!
//! The token is POSTed form-encoded and the client authenticates with HTTP
//! Basic credentials. Response parsing is lenient: fields of the wrong type
//! are treated as absent, and a body that is not JSON at all yields an empty
//! (inactive) response.

use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::coerce_timestamp;
use common::secret::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

/// The fields of an introspection response that authentication uses.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IntrospectionResponse {
    pub active: bool,
    pub sub: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// A string `aud` becomes a one-element list.
    pub aud: Option<Vec<String>>,
    pub scope: Option<String>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
}

fn string_field(object: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    object.get(name).and_then(Value::as_str).map(str::to_string)
}

impl IntrospectionResponse {
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let aud = match object.get("aud") {
            Some(Value::String(aud)) => Some(vec![aud.clone()]),
            Some(Value::Array(values)) => Some(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        };

        Self {
            active: object.get("active").and_then(Value::as_bool).unwrap_or(false),
            sub: string_field(object, "sub"),
            username: string_field(object, "username"),
            email: string_field(object, "email"),
            name: string_field(object, "name"),
            aud,
            scope: string_field(object, "scope"),
            exp: object.get("exp").and_then(coerce_timestamp),
            nbf: object.get("nbf").and_then(coerce_timestamp),
        }
    }

    /// Whether `expected` is one of the space-delimited scopes.
    pub fn has_scope(&self, expected: &str) -> bool {
        self.scope
            .as_deref()
            .is_some_and(|scope| scope.split_ascii_whitespace().any(|s| s == expected))
    }
}

// Identity fields stay out of logs.
impl fmt::Debug for IntrospectionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionResponse")
            .field("active", &self.active)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("aud", &self.aud)
            .field("scope", &self.scope)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .finish_non_exhaustive()
    }
}

/// Client for one provider's introspection endpoint.
#[derive(Clone)]
pub struct IntrospectionClient {
    endpoint: String,
    client_id: String,
    client_secret: SecretString,
    http_client: reqwest::Client,
}

impl fmt::Debug for IntrospectionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionClient")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl IntrospectionClient {
    pub fn new(
        endpoint: String,
        client_id: String,
        client_secret: SecretString,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    target: "mp_auth.introspection",
                    error = %e,
                    "Failed to build HTTP client with custom config, using defaults"
                );
                reqwest::Client::new()
            });

        Self {
            endpoint,
            client_id,
            client_secret,
            http_client,
        }
    }

    /// Ask the provider about `token`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ProviderUnavailable` when the request cannot be
    /// completed. Error statuses and unparsable bodies are not errors here;
    /// they produce an inactive response.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, AuthError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "mp_auth.introspection",
                    error = %e,
                    "Introspection request failed"
                );
                metrics::record_introspection("error");
                AuthError::ProviderUnavailable(format!("introspection request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "mp_auth.introspection",
                status = %status,
                "Introspection endpoint returned error status"
            );
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    target: "mp_auth.introspection",
                    error = %e,
                    "Failed to read introspection response"
                );
                metrics::record_introspection("error");
                return Ok(IntrospectionResponse::default());
            }
        };

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => {
                let outcome = if status.is_success() { "success" } else { "error" };
                metrics::record_introspection(outcome);
                Ok(IntrospectionResponse::from_json(&value))
            }
            Err(e) => {
                tracing::warn!(
                    target: "mp_auth.introspection",
                    error = %e,
                    "Introspection response is not JSON"
                );
                metrics::record_introspection("error");
                Ok(IntrospectionResponse::default())
            }
        }
    }
}
