//! Common utilities shared across the multi-provider authentication crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (unverified decoding, claim coercion, x5c handling)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
