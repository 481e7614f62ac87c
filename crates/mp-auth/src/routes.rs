//! HTTP routes.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::require_auth;
use crate::services::Authenticator;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Upper bound on a whole request, including verifier network calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
}

/// Build the application routes.
///
/// - `/health` - Liveness probe, public
/// - `/v1/whoami` - Identity behind the bearer token, authenticated
pub fn build_routes(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(handlers::health_check));

    let protected_routes = Router::new()
        .route("/v1/whoami", get(handlers::whoami))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
