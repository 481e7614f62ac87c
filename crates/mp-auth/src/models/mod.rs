//! Domain models shared by the stores, verifiers, and HTTP layer.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A trusted token issuer.
///
/// `iss` is the `iss` claim for signed tokens, or the configured provider
/// name for opaque-token providers.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Provider {
    pub provider_id: Uuid,
    pub iss: String,
}

/// A stored public key belonging to one provider.
///
/// Carries either an `x5c` certificate body or the RSA `n`/`e` components.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SigningKey {
    pub provider_id: Uuid,
    pub kid: String,
    pub kty: String,
    pub alg: Option<String>,
    pub x5c: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Key material as published in a JWKS document, before it is attached to a
/// provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSigningKey {
    pub kid: String,
    pub kty: String,
    pub alg: Option<String>,
    pub x5c: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Local user record.
#[derive(Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

/// Attributes for a user created on first sight of a subject.
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

// Usernames default to the provider subject and emails identify a person,
// so neither goes into Debug output.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("username", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl NewUser {
    /// Minimal user whose username is the provider subject.
    pub fn from_subject(subject: &str) -> Self {
        Self {
            username: subject.to_string(),
            email: None,
            first_name: String::new(),
            last_name: String::new(),
        }
    }
}

/// Link between a local user and a subject at one provider.
///
/// At most one association exists per (provider, subject).
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserAssociation {
    pub association_id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub subject: String,
}

impl fmt::Debug for UserAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAssociation")
            .field("association_id", &self.association_id)
            .field("user_id", &self.user_id)
            .field("provider_id", &self.provider_id)
            .field("subject", &"[REDACTED]")
            .finish()
    }
}

/// A resolved identity: the local user and how the provider knows them.
///
/// `Debug` output carries no subject, username or email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: User,
    pub association: UserAssociation,
    pub provider: Provider,
}

/// A previously verified token.
///
/// `exp` is unix seconds; the entry is usable while `exp >= now`.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub association_id: Uuid,
    pub scope: Option<String>,
    pub exp: i64,
}

// Tokens are bearer credentials; never let them reach a log line.
impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("association_id", &self.association_id)
            .field("scope", &self.scope)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Outcome of a successful authentication, inserted into request extensions
/// by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub identity: Identity,
    pub token: CachedToken,
}

impl Authenticated {
    pub fn user(&self) -> &User {
        &self.identity.user
    }

    pub fn issuer(&self) -> &str {
        &self.identity.provider.iss
    }

    pub fn subject(&self) -> &str {
        &self.identity.association.subject
    }
}
