//! Shared state for feed statuses and force-refresh bookkeeping

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::channel::ChannelState;
use crate::subscription::SubscriptionView;

/// Status of a single feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub name: String,
    pub url: String,
    pub mode: String,
    pub state: ChannelState,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub connected: bool,
    pub connecting: bool,
    pub loading: bool,
    pub last_update_epoch_ms: u64,
    pub consecutive_errors: u32,
}

impl FeedStatus {
    pub fn new(name: impl Into<String>, url: impl Into<String>, mode: &str) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            mode: mode.to_string(),
            state: ChannelState::Idle,
            data: None,
            error: None,
            connected: false,
            connecting: false,
            loading: true,
            last_update_epoch_ms: 0,
            consecutive_errors: 0,
        }
    }
}

/// Outcome of the periodic force-refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStatus {
    pub active: bool,
    pub interval_seconds: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_run_epoch_ms: Option<u64>,
    pub last_message: Option<String>,
    pub last_error: Option<String>,
}

/// Shared state accessible by feed tasks and the status API
#[derive(Debug)]
pub struct SharedState {
    pub feeds: Vec<FeedStatus>,
    pub refresh: RefreshStatus,
    pub started_at: Instant,
}

impl SharedState {
    pub fn new(feeds: Vec<FeedStatus>, refresh_interval_seconds: u64) -> Self {
        Self {
            feeds,
            refresh: RefreshStatus {
                interval_seconds: refresh_interval_seconds,
                ..RefreshStatus::default()
            },
            started_at: Instant::now(),
        }
    }

    pub fn feed(&self, name: &str) -> Option<&FeedStatus> {
        self.feeds.iter().find(|f| f.name == name)
    }

    /// Mirror a stream subscription's view, returning true if the record changed
    pub fn apply_view(&mut self, name: &str, view: &SubscriptionView, now_ms: u64) -> bool {
        let Some(status) = self.feeds.iter_mut().find(|f| f.name == name) else {
            return false;
        };
        let changed = status.data != view.data;
        status.state = view.state;
        status.data = view.data.clone();
        status.error = view.error.clone();
        status.connected = view.connected;
        status.connecting = view.connecting;
        status.loading = view.loading;
        status.consecutive_errors = view.retries;
        status.last_update_epoch_ms = now_ms;
        changed
    }

    /// Record one poll outcome, returning the feed's consecutive error count.
    /// A failed poll keeps the last good record.
    pub fn record_poll(
        &mut self,
        name: &str,
        outcome: std::result::Result<Value, String>,
        now_ms: u64,
    ) -> u32 {
        let Some(status) = self.feeds.iter_mut().find(|f| f.name == name) else {
            return 0;
        };
        status.connecting = false;
        status.loading = false;
        status.last_update_epoch_ms = now_ms;
        match outcome {
            Ok(record) => {
                status.state = ChannelState::Open;
                status.data = Some(record);
                status.error = None;
                status.connected = true;
                status.consecutive_errors = 0;
            }
            Err(error) => {
                status.state = ChannelState::Closed;
                status.error = Some(error);
                status.connected = false;
                status.consecutive_errors += 1;
            }
        }
        status.consecutive_errors
    }

    pub fn set_refresh_active(&mut self, active: bool) {
        self.refresh.active = active;
    }

    pub fn record_refresh(&mut self, outcome: std::result::Result<String, String>, now_ms: u64) {
        self.refresh.runs += 1;
        self.refresh.last_run_epoch_ms = Some(now_ms);
        match outcome {
            Ok(message) => {
                self.refresh.last_message = Some(message);
                self.refresh.last_error = None;
            }
            Err(error) => {
                self.refresh.failures += 1;
                self.refresh.last_error = Some(error);
            }
        }
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(feeds: Vec<FeedStatus>, refresh_interval_seconds: u64) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(
        feeds,
        refresh_interval_seconds,
    )))
}

/// Milliseconds since the Unix epoch
pub fn current_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
