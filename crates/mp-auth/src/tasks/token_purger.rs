//! Token cache purger background task.
//!
//! Lookups already ignore expired entries, but nothing else removes them, so
//! without this task the cache grows with every distinct token ever seen.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered. A purge that is
//! already running finishes first.

use crate::repositories::TokenStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Default purge interval in seconds.
pub const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 300;

/// Start the token purger background task.
///
/// Every `purge_interval` the task deletes cached tokens whose `exp` is in
/// the past. Store errors are logged and the loop keeps going.
#[instrument(skip_all, name = "mp_auth.task.token_purger")]
pub async fn start_token_purger(
    tokens: Arc<dyn TokenStore>,
    purge_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "mp_auth.task.token_purger",
        purge_interval_seconds = purge_interval.as_secs(),
        "Starting token purger task"
    );

    let mut interval = tokio::time::interval(purge_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match tokens.purge_expired(Utc::now().timestamp()).await {
                    Ok(count) => {
                        if count > 0 {
                            info!(
                                target: "mp_auth.task.token_purger",
                                purged_count = count,
                                "Purged expired cached tokens"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "mp_auth.task.token_purger",
                            error = %e,
                            "Failed to purge expired cached tokens"
                        );
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "mp_auth.task.token_purger",
                    "Token purger task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "mp_auth.task.token_purger",
        "Token purger task stopped"
    );
}
