//! Authentication middleware for protected routes.
//!
//! Reads the `Authorization` header, runs it through the `Authenticator`,
//! and inserts the resulting `Authenticated` into request extensions.

use crate::errors::AuthError;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Authentication middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if the header is malformed or every verifier
///   rejects the token
/// - Returns 500 if storage fails
/// - Continues to next handler with `Authenticated` in extensions otherwise
#[instrument(skip_all, name = "mp_auth.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| {
            tracing::debug!(
                target: "mp_auth.middleware",
                "Authorization header is not visible ASCII"
            );
            AuthError::MalformedAuthHeader("Invalid bearer header. Invalid characters.".to_string())
        })?),
        None => None,
    };

    let authenticated = state.authenticator.authenticate(header).await?;

    req.extensions_mut().insert(authenticated);

    Ok(next.run(req).await)
}
