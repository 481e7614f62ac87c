//! HTTP handlers.

use crate::models::Authenticated;
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

/// Liveness probe. Does not check dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Identity behind the presented token.
#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub issuer: String,
    pub scope: Option<String>,
    pub expires_at: i64,
}

/// `GET /v1/whoami`
pub async fn whoami(Extension(authenticated): Extension<Authenticated>) -> Json<WhoAmIResponse> {
    let Authenticated { identity, token } = authenticated;

    Json(WhoAmIResponse {
        user_id: identity.user.user_id,
        username: identity.user.username,
        email: identity.user.email,
        first_name: identity.user.first_name,
        last_name: identity.user.last_name,
        issuer: identity.provider.iss,
        scope: token.scope,
        expires_at: token.exp,
    })
}
