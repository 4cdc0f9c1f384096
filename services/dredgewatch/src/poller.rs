//! Polling fallback for feeds served only as request/response endpoints

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::DredgeApi;
use crate::state::{current_epoch_ms, StateHandle};

/// Consecutive failures after which a warning is logged
const ERROR_WARN_THRESHOLD: u32 = 5;

/// A feed fetched at a fixed interval
#[derive(Debug, Clone)]
pub struct PollFeed {
    pub name: String,
    pub path: String,
    pub interval: Duration,
}

/// Fetch `feed` every interval until `cancel` fires, mirroring each outcome
/// into shared state. The first fetch happens immediately.
pub async fn poll_loop(
    api: DredgeApi,
    feed: PollFeed,
    state: StateHandle,
    cancel: CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = api.fetch_record(&feed.path) => result.map_err(|e| e.to_string()),
        };

        match &outcome {
            Ok(_) => tracing::debug!("Poll '{}' succeeded", feed.name),
            Err(e) => tracing::debug!("Poll '{}' failed: {}", feed.name, e),
        }

        let errors = {
            let mut state_lock = state.write().await;
            state_lock.record_poll(&feed.name, outcome, current_epoch_ms())
        };
        if errors == ERROR_WARN_THRESHOLD {
            tracing::warn!("Feed '{}' has {} consecutive errors", feed.name, errors);
        }

        tokio::select! {
            _ = tokio::time::sleep(feed.interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
    tracing::debug!("Polling loop for '{}' cancelled", feed.name);
}
