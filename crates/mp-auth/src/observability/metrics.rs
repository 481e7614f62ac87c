//! Metrics definitions for mp-auth
//!
//! All metrics follow Prometheus naming conventions:
//! - `mp_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `result`: 2 values (hit, miss)
//! - `verifier`: 2 values (jwt, opaque)
//! - `status`: 2 values (success, error)
//! - `error_category`: bounded by `AuthError::category`
//! - `provider_kind`: 2 values (jwt, opaque)
//!
//! Issuer and provider names are deliberately not labels.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a token cache lookup
///
/// Metric: `mp_auth_cache_lookups_total`
/// Labels: `result`
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("mp_auth_cache_lookups_total", "result" => result).increment(1);
}

/// Record one verifier attempt
///
/// Metric: `mp_auth_verifications_total`
/// Labels: `verifier`, `status`, `error_category`
pub fn record_verification(
    verifier: &'static str,
    status: &'static str,
    error_category: Option<&'static str>,
) {
    let category = error_category.unwrap_or("none");
    counter!("mp_auth_verifications_total",
        "verifier" => verifier,
        "status" => status,
        "error_category" => category
    )
    .increment(1);
}

/// Record a JWKS download
///
/// Metric: `mp_auth_jwks_fetches_total`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str) {
    counter!("mp_auth_jwks_fetches_total", "status" => status).increment(1);
}

/// Record an introspection call
///
/// Metric: `mp_auth_introspections_total`
/// Labels: `status`
pub fn record_introspection(status: &'static str) {
    counter!("mp_auth_introspections_total", "status" => status).increment(1);
}

/// Record a user created on first sight of a subject
///
/// Metric: `mp_auth_users_created_total`
/// Labels: `provider_kind`
pub fn record_user_created(provider_kind: &'static str) {
    counter!("mp_auth_users_created_total", "provider_kind" => provider_kind).increment(1);
}

/// Record end-to-end authentication duration and outcome
///
/// Metric: `mp_auth_authentication_duration_seconds`
/// Labels: `status`
pub fn record_authentication(status: &'static str, duration: Duration) {
    histogram!("mp_auth_authentication_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}
