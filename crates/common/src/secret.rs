//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the OAuth client secrets that
//! authenticate introspection calls. Raw bearer tokens and the database URL
//! stay plain `String`s; the types holding them redact them in their own
//! `Debug` impls.
//!
//! `SecretString` implements `Debug` with redaction, so a struct deriving
//! `Debug` that holds one is safe to hand to `tracing`. The value is zeroized
//! on drop and can only be read through [`ExposeSecret::expose_secret`].
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ClientCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = ClientCredentials {
//!     client_id: "resource-server".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```
//!
//! With the `serde` feature of `secrecy` enabled (workspace default) secrets
//! deserialize straight out of the provider configuration JSON.

pub use secrecy::{ExposeSecret, SecretString};
