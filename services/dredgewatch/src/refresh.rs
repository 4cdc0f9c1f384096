//! Periodic force-refresh of the backend's subsystem records

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{DredgeApi, ForceRefreshResponse};
use crate::state::{current_epoch_ms, StateHandle};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns a single refresh timer. Constructed explicitly and started or
/// stopped by its owner; dropping the service stops it.
pub struct ForceRefreshService {
    api: DredgeApi,
    interval: Duration,
    state: StateHandle,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for ForceRefreshService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceRefreshService")
            .field("api", &self.api)
            .field("interval", &self.interval)
            .field("active", &self.is_active())
            .finish()
    }
}

impl ForceRefreshService {
    pub fn new(api: DredgeApi, interval: Duration, state: StateHandle) -> Self {
        Self {
            api,
            interval,
            state,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the refresh timer; an active timer is replaced. The first
    /// refresh fires one interval after starting.
    pub fn start(&self) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            self.api.clone(),
            self.interval,
            self.state.clone(),
            cancel.clone(),
        ));

        if let Some(previous) = self.running.lock().replace(Running { cancel, task }) {
            tracing::debug!("Restarting force-refresh timer");
            previous.cancel.cancel();
            previous.task.abort();
        }
        tracing::info!(
            "Force-refresh started, interval {}s",
            self.interval.as_secs()
        );
        self.mark_active(true);
    }

    /// Stop the refresh timer. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        running.cancel.cancel();
        running.task.abort();
        tracing::info!("Force-refresh stopped");
        self.mark_active(false);
        true
    }

    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Refresh once right now, outside the timer
    pub async fn refresh_now(&self) -> crate::Result<ForceRefreshResponse> {
        run_refresh(&self.api, &self.state).await
    }

    fn mark_active(&self, active: bool) {
        match self.state.try_write() {
            Ok(mut state) => state.set_refresh_active(active),
            Err(_) => {
                let state = self.state.clone();
                tokio::spawn(async move {
                    state.write().await.set_refresh_active(active);
                });
            }
        }
    }
}

impl Drop for ForceRefreshService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.task.abort();
        }
    }
}

async fn refresh_loop(
    api: DredgeApi,
    interval: Duration,
    state: StateHandle,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
        // Failures are recorded in shared state; the timer keeps running.
        let _ = run_refresh(&api, &state).await;
    }
}

async fn run_refresh(
    api: &DredgeApi,
    state: &StateHandle,
) -> crate::Result<ForceRefreshResponse> {
    let result = api.force_refresh().await;
    let outcome = match &result {
        Ok(response) => {
            tracing::info!("Force refresh completed: {}", response.message);
            Ok(response.message.clone())
        }
        Err(e) => {
            tracing::warn!("Force refresh failed: {}", e);
            Err(e.to_string())
        }
    };
    state.write().await.record_refresh(outcome, current_epoch_ms());
    result
}
