//! Signed-token (JWT) flow tests
//!
//! End-to-end through `Authenticator` with a wiremock JWKS endpoint and the
//! in-memory store: key download, signature verification, user creation,
//! token caching and key refresh behaviour.

use crate::harness::{ConfigBuilder, TestAuth};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mp_auth::repositories::TokenStore;
use mp_auth_test_utils::*;
use serde_json::json;

async fn issuer_with_key(key: &TestSigningKey) -> MockJwtIssuer {
    let idp = MockJwtIssuer::start().await;
    idp.serve_keys(&[key]).await;
    idp
}

fn single_issuer(idp: &MockJwtIssuer) -> ConfigBuilder {
    ConfigBuilder::new().jwt_issuer(&idp.issuer(), TEST_AUDIENCE)
}

#[tokio::test]
async fn test_first_use_creates_user_and_caches_token() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&key)?;

    // Act
    let authenticated = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(authenticated.issuer(), idp.issuer());
    assert_eq!(authenticated.subject(), TEST_SUBJECT_ALICE);
    assert_eq!(authenticated.user().username, TEST_SUBJECT_ALICE);
    assert_eq!(authenticated.token.scope, None);

    let counts = auth.store.counts().await;
    assert_eq!(counts.providers, 1);
    assert_eq!(counts.keys, 1);
    assert_eq!(counts.users, 1);
    assert_eq!(counts.associations, 1);
    assert_eq!(counts.tokens, 1);
    assert_eq!(idp.jwks_request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_long_subject_creates_user() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let subject = format!("{}@example.org", "s".repeat(400));
    let token = TestTokenBuilder::new(&idp.issuer())
        .for_subject(&subject)
        .sign(&key)?;

    // Act
    let authenticated = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(authenticated.subject(), subject);
    assert_eq!(authenticated.user().username, subject);

    Ok(())
}

#[tokio::test]
async fn test_cached_token_skips_jwks() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&key)?;
    let first = auth.authenticate(&token).await?;

    // Act
    let second = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(first, second);
    assert_eq!(idp.jwks_request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_new_token_for_known_subject_reuses_user() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let first_token = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("first"))
        .sign(&key)?;
    let second_token = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("second"))
        .sign(&key)?;

    // Act
    let first = auth.authenticate(&first_token).await?;
    let second = auth.authenticate(&second_token).await?;

    // Assert
    assert_eq!(first.user().user_id, second.user().user_id);
    let counts = auth.store.counts().await;
    assert_eq!(counts.users, 1);
    assert_eq!(counts.tokens, 2);

    Ok(())
}

#[tokio::test]
async fn test_distinct_subjects_get_distinct_users() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let alice = TestTokenBuilder::new(&idp.issuer()).sign(&key)?;
    let bob = TestTokenBuilder::new(&idp.issuer())
        .for_subject(TEST_SUBJECT_BOB)
        .sign(&key)?;

    // Act
    let alice = auth.authenticate(&alice).await?;
    let bob = auth.authenticate(&bob).await?;

    // Assert
    assert_ne!(alice.user().user_id, bob.user().user_id);
    assert_eq!(bob.user().username, TEST_SUBJECT_BOB);
    assert_eq!(auth.store.counts().await.users, 2);

    Ok(())
}

#[tokio::test]
async fn test_expired_cache_entry_is_verified_again() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&key)?;
    let first = auth.authenticate(&token).await?;

    let mut stale = first.token.clone();
    stale.exp = Utc::now().timestamp() - 10;
    auth.store.store(&stale).await?;

    // Act
    let second = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(idp.jwks_request_count().await, 2);
    assert_eq!(second.user().user_id, first.user().user_id);
    assert_eq!(auth.store.cached_token(&token).await, Some(first.token));

    Ok(())
}

#[tokio::test]
async fn test_token_without_exp_is_cached_for_default_ttl() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp).with("default_cache_ttl_seconds", json!(120)))?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .without_claim("exp")
        .sign(&key)?;

    // Act
    let before = Utc::now().timestamp();
    let authenticated = auth.authenticate(&token).await?;
    let after = Utc::now().timestamp();

    // Assert
    assert!(authenticated.token.exp >= before + 120);
    assert!(authenticated.token.exp <= after + 120);

    Ok(())
}

#[tokio::test]
async fn test_wrong_audience_is_rejected_before_any_io() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .with_audience(TEST_OTHER_AUDIENCE)
        .sign(&key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "Wrong audience of the token");
    assert_eq!(idp.jwks_request_count().await, 0);
    assert_eq!(auth.store.counts().await.providers, 0);

    Ok(())
}

#[tokio::test]
async fn test_untrusted_issuer_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new("https://rogue.example.org/").sign(&key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "Prohibited JWT token issuer");
    assert_eq!(idp.jwks_request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .expires_in(-60)
        .sign(&key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "Token expired");
    assert_eq!(auth.store.counts().await.tokens, 0);

    Ok(())
}

#[tokio::test]
async fn test_token_not_yet_valid_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .not_before_in(600)
        .sign(&key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert!(message.starts_with("Token cannot be used before "));

    Ok(())
}

#[tokio::test]
async fn test_missing_subject_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer())
        .without_claim("sub")
        .sign(&key)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "No sub claim in the JWT token");

    Ok(())
}

#[tokio::test]
async fn test_non_rs256_token_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;

    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(TEST_KEY_ID_1.to_string());
    let claims = TestTokenBuilder::new(&idp.issuer()).build();
    let token = encode(&header, &claims, &EncodingKey::from_secret(b"shared-secret"))?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert_eq!(message, "Unsupported JWT token algorithm");
    assert_eq!(idp.jwks_request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_signature_from_wrong_key_is_rejected() -> Result<(), anyhow::Error> {
    // Arrange: key 2 signs under key 1's kid.
    let published = test_signing_key(1)?;
    let impostor = test_signing_key(2)?.with_kid(TEST_KEY_ID_1);
    let idp = issuer_with_key(&published).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&impostor)?;

    // Act
    let message = auth.rejection(&token).await?;

    // Assert
    assert!(message.starts_with("Invalid token signature"), "got: {}", message);
    assert_eq!(auth.store.counts().await.users, 0);

    Ok(())
}

#[tokio::test]
async fn test_jwks_with_rsa_components_only() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = MockJwtIssuer::start().await;
    idp.serve_json(json!({ "keys": [key.jwk_components_json()] }))
        .await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&key)?;

    // Act
    let authenticated = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(authenticated.subject(), TEST_SUBJECT_ALICE);

    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_fails_until_key_is_published() -> Result<(), anyhow::Error> {
    // Arrange
    let old_key = test_signing_key(1)?;
    let new_key = test_signing_key(2)?;
    let idp = issuer_with_key(&old_key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let token = TestTokenBuilder::new(&idp.issuer()).sign(&new_key)?;

    // Act
    let before_rotation = auth.rejection(&token).await?;
    idp.serve_keys(&[&old_key, &new_key]).await;
    let after_rotation = auth.authenticate(&token).await;

    // Assert
    assert_eq!(before_rotation, "Could not obtain a corresponding JWK");
    assert!(after_rotation.is_ok());
    assert_eq!(auth.store.counts().await.keys, 2);

    Ok(())
}

#[tokio::test]
async fn test_on_miss_refresh_reuses_stored_key() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp).with("key_refresh", json!("on_miss")))?;
    let first = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("first"))
        .sign(&key)?;
    let second = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("second"))
        .sign(&key)?;

    // Act
    auth.authenticate(&first).await?;
    auth.authenticate(&second).await?;

    // Assert
    assert_eq!(idp.jwks_request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_always_refresh_downloads_for_every_fresh_token() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let first = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("first"))
        .sign(&key)?;
    let second = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("second"))
        .sign(&key)?;

    // Act
    auth.authenticate(&first).await?;
    auth.authenticate(&second).await?;

    // Assert
    assert_eq!(idp.jwks_request_count().await, 2);
    assert_eq!(auth.store.counts().await.keys, 1);

    Ok(())
}

#[tokio::test]
async fn test_stored_key_survives_jwks_outage() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let first = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("first"))
        .sign(&key)?;
    auth.authenticate(&first).await?;

    idp.serve_raw(503, "maintenance").await;
    let second = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("second"))
        .sign(&key)?;

    // Act
    let result = auth.authenticate(&second).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(idp.jwks_request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_unparsable_jwks_keeps_stored_keys() -> Result<(), anyhow::Error> {
    // Arrange
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let auth = TestAuth::new(single_issuer(&idp))?;
    let first = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("first"))
        .sign(&key)?;
    auth.authenticate(&first).await?;

    idp.serve_raw(200, "<html>not a key set</html>").await;
    let second = TestTokenBuilder::new(&idp.issuer())
        .with_claim("jti", json!("second"))
        .sign(&key)?;

    // Act
    let result = auth.authenticate(&second).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(auth.store.counts().await.keys, 1);

    Ok(())
}

#[tokio::test]
async fn test_kid_published_by_other_issuer_is_not_used() -> Result<(), anyhow::Error> {
    // Arrange: issuer A publishes the key, issuer B publishes nothing.
    let key = test_signing_key(1)?;
    let issuer_a = issuer_with_key(&key).await;
    let issuer_b = MockJwtIssuer::start().await;
    issuer_b.serve_json(json!({ "keys": [] })).await;
    let auth = TestAuth::new(
        ConfigBuilder::new()
            .jwt_issuer(&issuer_a.issuer(), TEST_AUDIENCE)
            .jwt_issuer(&issuer_b.issuer(), TEST_AUDIENCE),
    )?;

    let from_a = TestTokenBuilder::new(&issuer_a.issuer()).sign(&key)?;
    auth.authenticate(&from_a).await?;

    // B's token carries a kid that only A published.
    let from_b = TestTokenBuilder::new(&issuer_b.issuer()).sign(&key)?;

    // Act
    let message = auth.rejection(&from_b).await?;

    // Assert
    assert_eq!(message, "Could not obtain a corresponding JWK");
    assert_eq!(auth.store.counts().await.keys, 1);
    assert_eq!(auth.store.counts().await.users, 1);

    Ok(())
}

#[tokio::test]
async fn test_explicit_jwks_url_overrides_issuer_default() -> Result<(), anyhow::Error> {
    // Arrange: tokens name a logical issuer, keys come from the mock.
    let key = test_signing_key(1)?;
    let idp = issuer_with_key(&key).await;
    let issuer = "https://login.example.org/";
    let auth = TestAuth::new(ConfigBuilder::new().jwt_issuer_json(
        issuer,
        json!({
            "audience": TEST_AUDIENCE,
            "jwks_url": format!("{}{}", idp.issuer(), JWKS_PATH)
        }),
    ))?;
    let token = TestTokenBuilder::new(issuer).sign(&key)?;

    // Act
    let authenticated = auth.authenticate(&token).await?;

    // Assert
    assert_eq!(authenticated.issuer(), issuer);
    assert_eq!(idp.jwks_request_count().await, 1);

    Ok(())
}
