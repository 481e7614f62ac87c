//! # mp-auth Test Utilities
//!
//! Shared test utilities for the multi-provider authentication core.
//!
//! This crate provides:
//! - Fixed RSA crypto fixtures (keys + self-signed x5c certificates)
//! - Test data builders (`TestTokenBuilder`, `IntrospectionResponseBuilder`)
//! - Mock identity providers backed by `wiremock` (JWKS and introspection)
//! - Fixed test IDs (issuers, audiences, subjects, credentials)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mp_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let issuer = MockJwtIssuer::start().await;
//!     let key = test_signing_key(1)?;
//!     issuer.serve_keys(&[&key]).await;
//!
//!     let token = TestTokenBuilder::new(&issuer.issuer())
//!         .for_subject(TEST_SUBJECT_ALICE)
//!         .with_audience(TEST_AUDIENCE)
//!         .sign(&key)?;
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_providers;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_providers::*;
pub use test_ids::*;
pub use token_builders::*;
