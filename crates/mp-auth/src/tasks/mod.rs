//! Background tasks.
//!
//! # Tasks
//!
//! - `token_purger` - Deletes expired entries from the token cache

pub mod token_purger;

pub use token_purger::{start_token_purger, DEFAULT_PURGE_INTERVAL_SECONDS};
