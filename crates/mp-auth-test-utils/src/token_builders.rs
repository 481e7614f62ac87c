//! Builder patterns for test data construction
//!
//! Provides fluent APIs for signed-token claims and introspection responses.

use crate::crypto_fixtures::{FixtureError, TestSigningKey};
use crate::test_ids::{TEST_AUDIENCE, TEST_SUBJECT_ALICE};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for signed-token (JWT) claims
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("https://issuer.example/")
///     .for_subject("alice")
///     .with_audience("my-api")
///     .expires_in(3600)
///     .sign(&key)?;
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder with issuer, default audience and subject, and a one
    /// hour lifetime.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("sub".to_string(), json!(TEST_SUBJECT_ALICE));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the subject
    pub fn for_subject(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set the audience
    pub fn with_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", json!(nbf))
    }

    /// Set any claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Build and sign with RS256
    pub fn sign(self, key: &TestSigningKey) -> Result<String, FixtureError> {
        key.sign(&self.build())
    }
}

/// Builder for token introspection response bodies
///
/// Starts from an active token with a one hour lifetime.
pub struct IntrospectionResponseBuilder {
    fields: Map<String, Value>,
}

impl IntrospectionResponseBuilder {
    /// Active token for `subject`
    pub fn active(subject: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("active".to_string(), json!(true));
        fields.insert("sub".to_string(), json!(subject));
        fields.insert(
            "exp".to_string(),
            json!((Utc::now() + Duration::seconds(3600)).timestamp()),
        );
        Self { fields }
    }

    /// Inactive token (`{"active": false}` only, as RFC 7662 prescribes)
    pub fn inactive() -> Self {
        let mut fields = Map::new();
        fields.insert("active".to_string(), json!(false));
        Self { fields }
    }

    pub fn with_username(self, username: &str) -> Self {
        self.with_field("username", json!(username))
    }

    pub fn with_email(self, email: &str) -> Self {
        self.with_field("email", json!(email))
    }

    pub fn with_name(self, name: &str) -> Self {
        self.with_field("name", json!(name))
    }

    pub fn with_audiences(self, audiences: &[&str]) -> Self {
        self.with_field("aud", json!(audiences))
    }

    pub fn with_scope(self, scope: &str) -> Self {
        self.with_field("scope", json!(scope))
    }

    /// Set expiration in seconds from now
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_field("exp", json!(exp))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_field("nbf", json!(nbf))
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn without_field(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}
