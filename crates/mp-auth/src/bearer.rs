//! Bearer token extraction from an `Authorization` header value.

use crate::errors::AuthError;

const BEARER_SCHEME: &str = "bearer";

/// Extract the raw token from `Authorization: Bearer <token>`.
///
/// The header is split on ASCII whitespace; it must have exactly two parts
/// and the scheme is matched case-insensitively.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AuthError::MalformedAuthHeader("No authorization header.".to_string()))?;

    let mut parts = header.split_ascii_whitespace();
    let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
        (None, _, _) => {
            return Err(AuthError::MalformedAuthHeader(
                "Empty authorization header.".to_string(),
            ))
        }
        (Some(_), None, _) => {
            return Err(AuthError::MalformedAuthHeader(
                "Invalid bearer header. No credentials provided.".to_string(),
            ))
        }
        (Some(_), Some(_), Some(_)) => {
            return Err(AuthError::MalformedAuthHeader(
                "Invalid bearer header. Credentials string should not contain spaces.".to_string(),
            ))
        }
        (Some(scheme), Some(token), None) => (scheme, token),
    };

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::MalformedAuthHeader(
            "Invalid bearer header. Missing Bearer.".to_string(),
        ));
    }

    Ok(token)
}
