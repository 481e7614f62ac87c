//! HTTP surface tests
//!
//! Drive the router with `tower::ServiceExt::oneshot`: the public health
//! probe, and the bearer middleware in front of `/v1/whoami`.

use crate::harness::{ConfigBuilder, TestAuth};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mp_auth::routes::{build_routes, AppState};
use mp_auth_test_utils::*;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn app(endpoint: &MockIntrospectionEndpoint) -> Result<Router, anyhow::Error> {
    let auth = TestAuth::new(
        ConfigBuilder::new().opaque_provider(TEST_OPAQUE_PROVIDER, &endpoint.url()),
    )?;
    Ok(build_routes(Arc::new(AppState {
        authenticator: Arc::new(auth.authenticator),
    })))
}

fn whoami(authorization: Option<&str>) -> Result<Request<Body>, anyhow::Error> {
    let mut request = Request::builder().uri("/v1/whoami");
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }
    Ok(request.body(Body::empty())?)
}

async fn json_body(body: Body) -> Result<Value, anyhow::Error> {
    let bytes = body.collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_health_is_public() -> Result<(), anyhow::Error> {
    // Arrange
    let endpoint = MockIntrospectionEndpoint::start().await;
    let app = app(&endpoint).await?;

    // Act
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    assert_eq!(body, "OK");

    Ok(())
}

#[tokio::test]
async fn test_whoami_without_header_is_unauthorized() -> Result<(), anyhow::Error> {
    // Arrange
    let endpoint = MockIntrospectionEndpoint::start().await;
    let app = app(&endpoint).await?;

    // Act
    let response = app.oneshot(whoami(None)?).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(challenge.starts_with("Bearer "), "got: {}", challenge);

    let body = json_body(response.into_body()).await?;
    assert_eq!(body["error"]["code"], "MALFORMED_AUTH_HEADER");
    assert_eq!(body["error"]["message"], "No authorization header.");
    assert_eq!(endpoint.request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_whoami_with_rejected_token_is_unauthorized() -> Result<(), anyhow::Error> {
    // Arrange
    let endpoint = MockIntrospectionEndpoint::start().await;
    endpoint
        .respond_with(IntrospectionResponseBuilder::inactive().build())
        .await;
    let app = app(&endpoint).await?;

    // Act
    let response = app
        .oneshot(whoami(Some(&format!("Bearer {}", TEST_OPAQUE_TOKEN)))?)
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    let body = json_body(response.into_body()).await?;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    assert_eq!(body["error"]["message"], "Token not active");

    Ok(())
}

#[tokio::test]
async fn test_whoami_returns_identity() -> Result<(), anyhow::Error> {
    // Arrange
    let endpoint = MockIntrospectionEndpoint::start().await;
    endpoint
        .respond_with(
            IntrospectionResponseBuilder::active(TEST_SUBJECT_ALICE)
                .with_username(TEST_USERNAME_ALICE)
                .with_email(TEST_EMAIL_ALICE)
                .with_name(TEST_FULL_NAME_ALICE)
                .with_scope(TEST_SCOPE)
                .build(),
        )
        .await;
    let app = app(&endpoint).await?;

    // Act
    let response = app
        .oneshot(whoami(Some(&format!("bearer {}", TEST_OPAQUE_TOKEN)))?)
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await?;
    assert_eq!(body["username"], TEST_USERNAME_ALICE);
    assert_eq!(body["email"], TEST_EMAIL_ALICE);
    assert_eq!(body["first_name"], "Alice");
    assert_eq!(body["last_name"], "Liddell");
    assert_eq!(body["issuer"], TEST_OPAQUE_PROVIDER);
    assert_eq!(body["scope"], TEST_SCOPE);
    assert!(body["user_id"].is_string());
    assert!(body["expires_at"].is_i64());

    Ok(())
}
