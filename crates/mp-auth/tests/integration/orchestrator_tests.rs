//! Orchestration tests
//!
//! Both verifier kinds configured at once: routing between them, failure
//! aggregation, and issuer scoping of the shared token cache.

use crate::harness::{ConfigBuilder, TestAuth};
use mp_auth::repositories::MemoryStore;
use mp_auth::AuthError;
use mp_auth_test_utils::*;

struct Providers {
    key: TestSigningKey,
    jwt: MockJwtIssuer,
    opaque: MockIntrospectionEndpoint,
}

impl Providers {
    async fn start() -> Result<Self, anyhow::Error> {
        let key = test_signing_key(1)?;
        let jwt = MockJwtIssuer::start().await;
        jwt.serve_keys(&[&key]).await;
        let opaque = MockIntrospectionEndpoint::start().await;
        opaque
            .respond_with(IntrospectionResponseBuilder::active(TEST_SUBJECT_ALICE).build())
            .await;
        Ok(Self { key, jwt, opaque })
    }

    fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new()
            .jwt_issuer(&self.jwt.issuer(), TEST_AUDIENCE)
            .opaque_provider(TEST_OPAQUE_PROVIDER, &self.opaque.url())
    }

    fn jwt_token(&self) -> Result<String, anyhow::Error> {
        Ok(TestTokenBuilder::new(&self.jwt.issuer()).sign(&self.key)?)
    }
}

#[tokio::test]
async fn test_jwt_is_accepted_without_introspection() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    let auth = TestAuth::new(providers.config())?;

    // Act
    let authenticated = auth.authenticate(&providers.jwt_token()?).await?;

    // Assert
    assert_eq!(authenticated.issuer(), providers.jwt.issuer());
    assert_eq!(providers.opaque.request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_opaque_token_falls_through_to_introspection() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    let auth = TestAuth::new(providers.config())?;

    // Act
    let authenticated = auth.authenticate(TEST_OPAQUE_TOKEN).await?;

    // Assert
    assert_eq!(authenticated.issuer(), TEST_OPAQUE_PROVIDER);
    assert_eq!(providers.jwt.jwks_request_count().await, 0);
    assert_eq!(providers.opaque.request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_failure_lists_every_reason_in_order() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    providers
        .opaque
        .respond_with(IntrospectionResponseBuilder::inactive().build())
        .await;
    let auth = TestAuth::new(providers.config())?;

    // Act
    let message = auth.rejection(TEST_OPAQUE_TOKEN).await?;

    // Assert
    assert_eq!(message, "Token is not a three-part JWT. Or: Token not active");

    Ok(())
}

#[tokio::test]
async fn test_rejected_jwt_is_still_offered_to_introspection() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    providers
        .opaque
        .respond_with(IntrospectionResponseBuilder::inactive().build())
        .await;
    let auth = TestAuth::new(providers.config())?;
    let token = TestTokenBuilder::new(&providers.jwt.issuer())
        .with_audience(TEST_OTHER_AUDIENCE)
        .sign(&providers.key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "Wrong audience of the token. Or: Token not active");
    assert_eq!(providers.opaque.request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_same_subject_at_two_providers_is_two_users() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    let auth = TestAuth::new(providers.config())?;

    // Act
    let via_jwt = auth.authenticate(&providers.jwt_token()?).await?;
    let via_opaque = auth.authenticate(TEST_OPAQUE_TOKEN).await?;

    // Assert
    assert_eq!(via_jwt.subject(), via_opaque.subject());
    assert_ne!(via_jwt.user().user_id, via_opaque.user().user_id);
    let counts = auth.store.counts().await;
    assert_eq!(counts.providers, 2);
    assert_eq!(counts.users, 2);

    Ok(())
}

#[tokio::test]
async fn test_cache_entry_of_removed_provider_is_ignored() -> Result<(), anyhow::Error> {
    // Arrange: cache an opaque token, then drop its provider from config.
    let providers = Providers::start().await?;
    let store = MemoryStore::new();
    let before = TestAuth::with_store(providers.config(), store.clone())?;
    before.authenticate(TEST_OPAQUE_TOKEN).await?;

    let after = TestAuth::with_store(
        ConfigBuilder::new().jwt_issuer(&providers.jwt.issuer(), TEST_AUDIENCE),
        store,
    )?;

    // Act
    let result = after.authenticate(TEST_OPAQUE_TOKEN).await;

    // Assert
    assert!(matches!(
        result,
        Err(AuthError::Aggregate(ref message)) if message == "Token is not a three-part JWT"
    ));
    assert_eq!(providers.opaque.request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_malformed_header_skips_every_verifier() -> Result<(), anyhow::Error> {
    // Arrange
    let providers = Providers::start().await?;
    let auth = TestAuth::new(providers.config())?;

    // Act
    let result = auth
        .authenticator
        .authenticate(Some(&format!("Token {}", TEST_OPAQUE_TOKEN)))
        .await;

    // Assert
    assert!(matches!(result, Err(AuthError::MalformedAuthHeader(_))));
    assert_eq!(providers.opaque.request_count().await, 0);
    assert_eq!(providers.jwt.jwks_request_count().await, 0);

    Ok(())
}
