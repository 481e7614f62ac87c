use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// `WWW-Authenticate` challenge sent with every 401 (RFC 6750 section 3).
const BEARER_CHALLENGE: &str = r#"Bearer realm="mp-auth", error="invalid_token""#;

/// Failures raised by the storage layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. a concurrent writer created
    /// the same association first).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Every way an authentication attempt can fail.
///
/// Messages are shown to clients and must never contain token material.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    MalformedAuthHeader(String),

    #[error("{0}")]
    TokenMalformed(String),

    #[error("{0}")]
    UnsupportedTokenFormat(String),

    #[error("Prohibited JWT token issuer")]
    UntrustedIssuer,

    #[error("Wrong audience of the token")]
    AudienceMismatch,

    #[error("No sub claim in the JWT token")]
    MissingSubject,

    #[error("Invalid introspection response: missing sub")]
    InvalidIntrospectionResponse,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token cannot be used before {0}")]
    TokenNotYetValid(i64),

    #[error("Could not obtain a corresponding JWK")]
    KeyResolutionFailed,

    #[error("Invalid token signature: {0}")]
    SignatureInvalid(String),

    #[error("Token not active")]
    TokenNotActive,

    #[error("Wrong scope of the token")]
    ScopeMismatch,

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Every configured verifier rejected the token; the message lists each
    /// verifier's reason in attempt order.
    #[error("{0}")]
    Aggregate(String),
}

impl AuthError {
    /// Storage failures abort authentication instead of falling through to
    /// the next verifier.
    pub fn is_storage(&self) -> bool {
        matches!(self, AuthError::Storage(_))
    }

    /// Bounded label for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            AuthError::MalformedAuthHeader(_) => "malformed_header",
            AuthError::TokenMalformed(_) | AuthError::UnsupportedTokenFormat(_) => {
                "malformed_token"
            }
            AuthError::UntrustedIssuer => "untrusted_issuer",
            AuthError::AudienceMismatch => "audience",
            AuthError::MissingSubject | AuthError::InvalidIntrospectionResponse => {
                "missing_subject"
            }
            AuthError::TokenExpired | AuthError::TokenNotYetValid(_) => "lifetime",
            AuthError::KeyResolutionFailed => "key_resolution",
            AuthError::SignatureInvalid(_) => "signature",
            AuthError::TokenNotActive => "not_active",
            AuthError::ScopeMismatch => "scope",
            AuthError::ProviderUnavailable(_) => "provider_unavailable",
            AuthError::Storage(_) => "storage",
            AuthError::Aggregate(_) => "rejected",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::Storage(e) => {
                tracing::error!(
                    target: "mp_auth.errors",
                    error = %e,
                    "Storage failure during authentication"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AuthError::MalformedAuthHeader(reason) => (
                StatusCode::UNAUTHORIZED,
                "MALFORMED_AUTH_HEADER",
                reason.clone(),
            ),
            other => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", other.to_string()),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BEARER_CHALLENGE),
            );
        }
        response
    }
}
