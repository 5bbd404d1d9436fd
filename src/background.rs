//! Periodic maintenance: expired bearer-token cleanup.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthConfig, prune_expired_tokens};
use crate::config::TOKEN_PRUNE_INTERVAL_SECS;

/// Spawns the token-pruning loop for the lifetime of the process.
pub fn spawn_background_tasks(auth: Arc<AuthConfig>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TOKEN_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            prune_expired_tokens(&auth).await;
        }
    });
}
