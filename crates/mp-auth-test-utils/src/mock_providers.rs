//! Mock identity providers backed by `wiremock`.
//!
//! - `MockJwtIssuer` serves `/.well-known/jwks.json` at its base URL, which is
//!   also its issuer string.
//! - `MockIntrospectionEndpoint` answers RFC 7662 introspection POSTs,
//!   requiring HTTP Basic auth with the test client credentials.
//!
//! # Example
//!
//! ```rust,ignore
//! let idp = MockIntrospectionEndpoint::start().await;
//! idp.respond_with(IntrospectionResponseBuilder::inactive().build()).await;
//! ```

use crate::crypto_fixtures::{jwks_json, TestSigningKey};
use crate::test_ids::{TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_INTROSPECTION_PATH};
use serde_json::Value;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path every issuer publishes its key set under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A signed-token issuer with a JWKS endpoint.
pub struct MockJwtIssuer {
    pub server: MockServer,
}

impl MockJwtIssuer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer string (`iss` claim); the JWKS lives under it.
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Serve a key set, replacing anything mounted before.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        self.serve_json(jwks_json(keys)).await;
    }

    /// Serve an arbitrary JWKS body, replacing anything mounted before.
    pub async fn serve_json(&self, body: Value) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a raw response, replacing anything mounted before.
    pub async fn serve_raw(&self, status: u16, body: &str) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Number of JWKS requests received so far.
    pub async fn jwks_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

/// An opaque-token provider's introspection endpoint.
pub struct MockIntrospectionEndpoint {
    pub server: MockServer,
}

impl MockIntrospectionEndpoint {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full introspection URL to put in the provider configuration.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), TEST_INTROSPECTION_PATH)
    }

    /// Answer authenticated introspection requests with `body`, replacing
    /// anything mounted before.
    pub async fn respond_with(&self, body: Value) {
        self.server.reset().await;
        Mock::given(method("POST"))
            .and(path(TEST_INTROSPECTION_PATH))
            .and(basic_auth(TEST_CLIENT_ID, TEST_CLIENT_SECRET))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer authenticated introspection requests with a raw body.
    pub async fn respond_with_raw(&self, status: u16, body: &str) {
        self.server.reset().await;
        Mock::given(method("POST"))
            .and(path(TEST_INTROSPECTION_PATH))
            .and(basic_auth(TEST_CLIENT_ID, TEST_CLIENT_SECRET))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Number of introspection requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Form bodies of the requests received so far.
    pub async fn request_bodies(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| String::from_utf8_lossy(&request.body).into_owned())
            .collect()
    }
}
