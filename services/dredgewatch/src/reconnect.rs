//! Bounded fixed-delay reconnection policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// How a channel recovers from transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Outcome of evaluating a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay; carries the updated retry counter
    RetryAfter { delay: Duration, retries: u32 },
    /// Budget spent; carries the final retry counter
    GiveUp { retries: u32 },
}

impl ReconnectPolicy {
    pub fn new(retry_delay: Duration, max_retries: u32) -> Self {
        Self {
            retry_delay_ms: retry_delay.as_millis() as u64,
            max_retries,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Decide what follows a failure when `retries` reconnects have already
    /// been scheduled. A channel gets `max_retries` reconnects and fails on
    /// the next error; the counter never exceeds `max_retries`.
    pub fn evaluate(&self, retries: u32) -> RetryDecision {
        if retries < self.max_retries {
            RetryDecision::RetryAfter {
                delay: self.retry_delay(),
                retries: retries + 1,
            }
        } else {
            RetryDecision::GiveUp {
                retries: self.max_retries,
            }
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
