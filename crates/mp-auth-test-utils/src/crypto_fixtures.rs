//! Fixed RSA fixtures for testing
//!
//! Two 2048-bit RSA keys, each with a self-signed certificate whose base64
//! DER body is published as the `x5c` entry of a JWK. The material was
//! generated once with openssl and is checked in, so every run signs and
//! verifies with the same keys.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

// Signing Key IDs (strings)
pub const TEST_KEY_ID_1: &str = "mp-test-key-2025-01";
pub const TEST_KEY_ID_2: &str = "mp-test-key-2025-02";

/// RSA public exponent shared by both fixtures (65537).
pub const TEST_RSA_EXPONENT: &str = "AQAB";

const PRIVATE_KEY_1: &str = include_str!("../fixtures/rsa_private_key_1.pem");
const PRIVATE_KEY_2: &str = include_str!("../fixtures/rsa_private_key_2.pem");
const X5C_1: &str = include_str!("../fixtures/x5c_certificate_1.txt");
const X5C_2: &str = include_str!("../fixtures/x5c_certificate_2.txt");
const MODULUS_1: &str = include_str!("../fixtures/rsa_modulus_1.txt");
const MODULUS_2: &str = include_str!("../fixtures/rsa_modulus_2.txt");

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Unknown fixture key: {0}")]
    UnknownKey(u8),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// An RSA signing key with its published certificate.
#[derive(Debug, Clone)]
pub struct TestSigningKey {
    /// Key ID placed in token headers and in the JWK.
    pub kid: String,
    private_key_pem: &'static str,
    x5c: &'static str,
    modulus: &'static str,
}

/// Load fixture key `1` or `2`.
///
/// # Example
/// ```rust,ignore
/// let key = test_signing_key(1)?;
/// let token = key.sign(&claims)?;
/// ```
pub fn test_signing_key(number: u8) -> Result<TestSigningKey, FixtureError> {
    let (kid, private_key_pem, x5c, modulus) = match number {
        1 => (TEST_KEY_ID_1, PRIVATE_KEY_1, X5C_1, MODULUS_1),
        2 => (TEST_KEY_ID_2, PRIVATE_KEY_2, X5C_2, MODULUS_2),
        other => return Err(FixtureError::UnknownKey(other)),
    };

    Ok(TestSigningKey {
        kid: kid.to_string(),
        private_key_pem,
        x5c,
        modulus,
    })
}

impl TestSigningKey {
    /// Same key material published under a different key ID.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Base64 DER certificate body, as served in `x5c`.
    pub fn x5c(&self) -> &str {
        self.x5c.trim()
    }

    /// Base64url RSA modulus, as served in `n`.
    pub fn modulus(&self) -> &str {
        self.modulus.trim()
    }

    /// Sign claims with RS256 and the standard `{"typ":"JWT","kid":...}` header.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, FixtureError> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header.
    ///
    /// The header's `alg` must be an RSA algorithm.
    pub fn sign_with_header<T: Serialize>(
        &self,
        header: &Header,
        claims: &T,
    ) -> Result<String, FixtureError> {
        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .map_err(|e| FixtureError::Crypto(format!("Failed to load RSA key: {}", e)))?;

        encode(header, claims, &key)
            .map_err(|e| FixtureError::Crypto(format!("Failed to sign token: {}", e)))
    }

    /// JWK entry carrying the certificate chain (`x5c`).
    pub fn jwk_json(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "x5c": [self.x5c()]
        })
    }

    /// JWK entry carrying only the RSA components (`n`, `e`).
    pub fn jwk_components_json(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.modulus(),
            "e": TEST_RSA_EXPONENT
        })
    }
}

/// JWKS document with the given keys, x5c form.
pub fn jwks_json(keys: &[&TestSigningKey]) -> Value {
    json!({
        "keys": keys.iter().map(|key| key.jwk_json()).collect::<Vec<_>>()
    })
}
