//! Fixed test IDs for deterministic tests
//!
//! Using fixed identifiers keeps failures reproducible and lets assertions
//! compare against constants instead of values captured mid-test.

// Audiences
pub const TEST_AUDIENCE: &str = "https://api.example.org/mp-auth-test";
pub const TEST_OTHER_AUDIENCE: &str = "https://api.example.org/someone-else";

// Subjects
pub const TEST_SUBJECT_ALICE: &str = "c8a5f6d2-alice";
pub const TEST_SUBJECT_BOB: &str = "0b1d9e7f-bob";

// Opaque-token provider
pub const TEST_OPAQUE_PROVIDER: &str = "globus";
pub const TEST_INTROSPECTION_PATH: &str = "/v2/oauth2/token/introspect";
pub const TEST_CLIENT_ID: &str = "mp-auth-test-client";
pub const TEST_CLIENT_SECRET: &str = "test-secret-do-not-use-in-production";
pub const TEST_SCOPE: &str = "urn:globus:auth:scope:api.example.org:all";

// Opaque tokens (no whitespace, form-encoding safe)
pub const TEST_OPAQUE_TOKEN: &str = "AgQ3opaque-token-0001";
pub const TEST_OPAQUE_TOKEN_2: &str = "AgQ3opaque-token-0002";

// Profile data returned by the mock introspection endpoint
pub const TEST_USERNAME_ALICE: &str = "alice@example.org";
pub const TEST_EMAIL_ALICE: &str = "alice@example.org";
pub const TEST_FULL_NAME_ALICE: &str = "Alice Liddell";
