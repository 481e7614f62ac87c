//! JWT utilities shared by the authentication crates.
//!
//! This module provides the pieces of JWT handling that happen BEFORE a
//! signature can be checked:
//! - Size limits for DoS prevention
//! - Unverified decoding of the header and claims (to learn `iss` and `kid`)
//! - Lenient coercion of numeric date claims (`exp`, `nbf`)
//! - Wrapping a JWKS `x5c` entry as a PEM certificate
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Nothing returned by [`decode_unverified`] is trustworthy until the
//!   signature has been verified with a key from a trusted issuer
//! - Only RS256 is accepted by the verifier; [`RS256`] is the single source of
//!   that constant

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// The only signing algorithm accepted for self-contained tokens.
pub const RS256: &str = "RS256";

/// The only token type accepted in the JWT `typ` header.
pub const JWT_TYPE: &str = "JWT";

/// Line width used when wrapping DER base64 into PEM.
const PEM_LINE_WIDTH: usize = 64;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding a JWT without verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds the maximum size of {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token does not have the `header.payload.signature` shape.
    #[error("Token is not a three-part JWT")]
    MalformedStructure,

    /// Header is not base64url JSON object.
    #[error("Error when decoding the JWT header: {0}")]
    InvalidHeader(String),

    /// Payload is not a base64url JSON object, or a date claim is not numeric.
    #[error("Error when decoding the JWT token payload: {0}")]
    InvalidPayload(String),
}

// =============================================================================
// Decoded Types
// =============================================================================

/// The JOSE header fields the verifier cares about.
///
/// Fields that are absent, or present with a non-string value, are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Token type (`typ`).
    pub typ: Option<String>,
    /// Signing algorithm (`alg`).
    pub alg: Option<String>,
    /// Key identifier (`kid`).
    pub kid: Option<String>,
}

/// A JWT split into its header and claims, signature NOT verified.
#[derive(Clone)]
pub struct UnverifiedToken {
    /// Decoded header.
    pub header: UnverifiedHeader,
    /// Decoded claim set.
    pub claims: Map<String, Value>,
}

/// Claims can carry the subject and arbitrary provider data, so only the
/// claim names are printed.
impl fmt::Debug for UnverifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnverifiedToken")
            .field("header", &self.header)
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl UnverifiedToken {
    /// Returns a string claim, or `None` when absent or not a string.
    #[must_use]
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Returns a numeric date claim (`exp`, `nbf`, ...).
    ///
    /// # Errors
    ///
    /// Returns `JwtDecodeError::InvalidPayload` if the claim is present but
    /// cannot be read as a unix timestamp.
    pub fn timestamp_claim(&self, name: &str) -> Result<Option<i64>, JwtDecodeError> {
        match self.claims.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => coerce_timestamp(value).map(Some).ok_or_else(|| {
                JwtDecodeError::InvalidPayload(format!("'{name}' claim is not a timestamp"))
            }),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Decode a JWT's header and claims without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - Use the result only to pick the issuer configuration and signing key
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedStructure` - Token does not have exactly three dot-separated parts
/// - `InvalidHeader` - Header is not base64url-encoded JSON object
/// - `InvalidPayload` - Payload is not base64url-encoded JSON object
pub fn decode_unverified(token: &str) -> Result<UnverifiedToken, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtDecodeError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtDecodeError::MalformedStructure);
    };

    let header = decode_segment(header_part).map_err(JwtDecodeError::InvalidHeader)?;
    let claims = decode_segment(payload_part).map_err(JwtDecodeError::InvalidPayload)?;

    let header_str = |name: &str| {
        header
            .get(name)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };

    Ok(UnverifiedToken {
        header: UnverifiedHeader {
            typ: header_str("typ"),
            alg: header_str("alg"),
            kid: header_str("kid"),
        },
        claims,
    })
}

/// Decode one base64url JSON object segment.
fn decode_segment(segment: &str) -> Result<Map<String, Value>, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| format!("invalid base64: {e}"))?;

    match serde_json::from_slice::<Value>(&bytes).map_err(|e| format!("invalid JSON: {e}"))? {
        Value::Object(map) => Ok(map),
        _ => Err("not a JSON object".to_string()),
    }
}

/// Read a JSON value as a unix timestamp.
///
/// Accepts integers, floats (truncated) and integer strings; everything else
/// yields `None`. Providers are not consistent about the JSON type of date
/// fields, especially in introspection responses.
#[must_use]
pub fn coerce_timestamp(value: &Value) -> Option<i64> {
    match value {
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Wrap the base64 DER body of an `x5c` entry as a PEM certificate.
///
/// Whitespace in the input is dropped and the body is re-wrapped at 64
/// columns.
#[must_use]
pub fn x5c_to_pem(x5c: &str) -> String {
    let body: String = x5c.chars().filter(|c| !c.is_whitespace()).collect();

    let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

// =============================================================================
// Tests
// =============================================================================
