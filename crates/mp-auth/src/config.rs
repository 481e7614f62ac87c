//! Configuration.
//!
//! `AuthConfig` describes the trusted providers and is deserialized from
//! JSON. `ServerConfig` is loaded from environment variables by the
//! `mp-auth-server` binary and carries an `AuthConfig` inside.

use crate::tasks::DEFAULT_PURGE_INTERVAL_SECONDS;
use common::secret::SecretString;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Name of the opaque-token provider with a built-in introspection URL.
pub const GLOBUS_PROVIDER: &str = "globus";

/// Introspection endpoint used for `globus` when none is configured.
pub const GLOBUS_INTROSPECTION_URL: &str = "https://auth.globus.org/v2/oauth2/token/introspect";

/// Cache lifetime for tokens that carry no `exp` (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Timeout for JWKS and introspection requests.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default size of the Postgres connection pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to read auth config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse auth config: {0}")]
    Parse(String),

    #[error("Invalid auth config: {0}")]
    Invalid(String),
}

/// When the signed-token verifier downloads an issuer's JWKS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRefresh {
    /// Fetch on every fresh verification.
    #[default]
    Always,
    /// Fetch only when the (issuer, kid) key is not stored yet.
    OnMiss,
}

/// A trusted signed-token issuer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtIssuerConfig {
    /// Exact `aud` value tokens from this issuer must carry.
    pub audience: String,

    /// JWKS location; defaults to `{issuer}/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_url: Option<String>,
}

impl JwtIssuerConfig {
    pub fn jwks_url_for(&self, issuer: &str) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/')),
        }
    }
}

/// A trusted opaque-token provider reached through RFC 7662 introspection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpaqueProviderConfig {
    /// Provider name; also the issuer string its users are stored under.
    pub name: String,

    /// Required audience, checked when the response carries `aud`.
    #[serde(default)]
    pub audience: Option<String>,

    /// Required scope, checked when the response carries `scope`.
    #[serde(default)]
    pub scope: Option<String>,

    pub client_id: String,
    pub client_secret: SecretString,

    #[serde(default)]
    pub introspection_url: Option<String>,
}

impl OpaqueProviderConfig {
    /// Configured introspection URL, or the built-in one for `globus`.
    pub fn introspection_endpoint(&self) -> Option<&str> {
        match &self.introspection_url {
            Some(url) => Some(url.as_str()),
            None if self.name == GLOBUS_PROVIDER => Some(GLOBUS_INTROSPECTION_URL),
            None => None,
        }
    }
}

/// Which providers to trust and how to talk to them.
///
/// # Example
///
/// ```json
/// {
///   "jwt_issuers": {
///     "https://login.example.org/": { "audience": "my-api" }
///   },
///   "opaque_providers": [
///     { "name": "globus", "client_id": "abc", "client_secret": "xyz",
///       "scope": "urn:globus:auth:scope:my-api:all" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_issuers: HashMap<String, JwtIssuerConfig>,

    /// Tried in order after the signed-token verifier.
    #[serde(default)]
    pub opaque_providers: Vec<OpaqueProviderConfig>,

    #[serde(default = "default_cache_ttl_seconds")]
    pub default_cache_ttl_seconds: u64,

    #[serde(default)]
    pub key_refresh: KeyRefresh,

    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_http_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

impl AuthConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AuthConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_issuers.is_empty() && self.opaque_providers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one JWT issuer or opaque provider must be configured".to_string(),
            ));
        }

        for (issuer, issuer_config) in &self.jwt_issuers {
            if issuer.is_empty() {
                return Err(ConfigError::Invalid("JWT issuer must not be empty".to_string()));
            }
            if issuer_config.audience.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "JWT issuer {} has an empty audience",
                    issuer
                )));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.opaque_providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "opaque provider name must not be empty".to_string(),
                ));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate opaque provider {}",
                    provider.name
                )));
            }
            if self.jwt_issuers.contains_key(&provider.name) {
                return Err(ConfigError::Invalid(format!(
                    "opaque provider {} collides with a JWT issuer",
                    provider.name
                )));
            }
            if provider.introspection_endpoint().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "opaque provider {} needs an introspection_url",
                    provider.name
                )));
            }
            if provider.client_id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "opaque provider {} has an empty client_id",
                    provider.name
                )));
            }
        }

        if self.default_cache_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "default_cache_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_seconds must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Every issuer string a cached token may belong to.
    pub fn accepted_issuers(&self) -> HashSet<String> {
        self.jwt_issuers
            .keys()
            .cloned()
            .chain(self.opaque_providers.iter().map(|p| p.name.clone()))
            .collect()
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Settings for the `mp-auth-server` binary.
#[derive(Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_address: String,
    pub db_max_connections: u32,
    pub token_purge_interval_seconds: u64,
    pub auth: AuthConfig,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("db_max_connections", &self.db_max_connections)
            .field(
                "token_purge_interval_seconds",
                &self.token_purge_interval_seconds,
            )
            .field("auth", &self.auth)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    ///
    /// The auth config comes from exactly one of `MP_AUTH_CONFIG` (inline
    /// JSON) or `MP_AUTH_CONFIG_PATH` (path to a JSON file).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let db_max_connections =
            parse_positive(vars, "DB_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

        let token_purge_interval_seconds = parse_positive(vars, "TOKEN_PURGE_INTERVAL_SECONDS")?
            .unwrap_or(DEFAULT_PURGE_INTERVAL_SECONDS);

        let auth_json = match (vars.get("MP_AUTH_CONFIG"), vars.get("MP_AUTH_CONFIG_PATH")) {
            (Some(inline), None) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    name: "MP_AUTH_CONFIG".to_string(),
                    reason: "set only one of MP_AUTH_CONFIG and MP_AUTH_CONFIG_PATH".to_string(),
                })
            }
            (None, None) => {
                return Err(ConfigError::MissingEnvVar(
                    "MP_AUTH_CONFIG or MP_AUTH_CONFIG_PATH".to_string(),
                ))
            }
        };

        let auth = AuthConfig::from_json(&auth_json)?;

        Ok(ServerConfig {
            database_url,
            bind_address,
            db_max_connections,
            token_purge_interval_seconds,
            auth,
        })
    }

    pub fn token_purge_interval(&self) -> Duration {
        Duration::from_secs(self.token_purge_interval_seconds)
    }
}

/// Read `name` as a positive integer, or `None` when it is unset.
fn parse_positive<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(value) = vars.get(name) else {
        return Ok(None);
    };
    value
        .parse::<T>()
        .ok()
        .filter(|n| *n > T::default())
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("expected a positive integer, got {:?}", value),
        })
}
