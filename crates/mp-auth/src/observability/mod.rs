//! Observability for authentication.
//!
//! Log fields follow a simple rule: issuers, provider names, key IDs, and
//! internal UUIDs may be logged; raw tokens, client secrets, and provider
//! subjects must not.

pub mod metrics;
