//! Channel lifecycle as a finite-state machine
//!
//! [`Channel::apply`] performs no I/O: it updates the channel's bookkeeping
//! and returns the [`Effect`]s the driver in [`crate::client`] must carry out.
//! This keeps the reconnection rules testable without a network stack.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;
use crate::normalize::normalize;
use crate::reconnect::{ReconnectPolicy, RetryDecision};

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "Idle"),
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::Closed => write!(f, "Closed"),
            ChannelState::Failed => write!(f, "Failed"),
        }
    }
}

/// Inputs to the state machine, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Initial connection request
    Connect,
    /// The transport finished establishing the connection
    Opened,
    /// Raw message body received on an open connection
    Message(String),
    /// Transport-level failure, either while connecting or once open
    TransportError(String),
    /// The server ended the stream
    TransportClosed,
    /// The connection could not be created at all
    ConstructionFailed(String),
    /// The retry timer fired
    RetryElapsed,
    /// Explicit reconnect from the owner
    Reconnect,
    /// Explicit close from the owner
    Close,
}

/// Something the consumer should be told about
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Opened,
    Message(Option<Value>),
    ParseError(ChannelError),
    Error(ChannelError),
    Closed,
}

/// Work the driver performs on behalf of the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenTransport,
    DropTransport,
    ScheduleRetry(Duration),
    CancelRetry,
    Notify(Notice),
}

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub url: String,
    pub state: ChannelState,
    pub data: Option<Value>,
    pub error: Option<ChannelError>,
    pub retries: u32,
}

impl ChannelSnapshot {
    pub fn connected(&self) -> bool {
        self.state == ChannelState::Open
    }

    pub fn connecting(&self) -> bool {
        self.state == ChannelState::Connecting
    }

    pub fn loading(&self) -> bool {
        self.connecting() || (!self.connected() && self.error.is_none())
    }
}

/// One logical subscription to a streaming endpoint
#[derive(Debug, Clone)]
pub struct Channel {
    url: String,
    policy: ReconnectPolicy,
    state: ChannelState,
    data: Option<Value>,
    error: Option<ChannelError>,
    retries: u32,
    retry_pending: bool,
}

impl Channel {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            state: ChannelState::Idle,
            data: None,
            error: None,
            retries: 0,
            retry_pending: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            url: self.url.clone(),
            state: self.state,
            data: self.data.clone(),
            error: self.error.clone(),
            retries: self.retries,
        }
    }

    /// Advance the state machine by one event
    pub fn apply(&mut self, event: ChannelEvent) -> Vec<Effect> {
        match event {
            ChannelEvent::Connect => {
                if self.state != ChannelState::Idle {
                    return Vec::new();
                }
                self.state = ChannelState::Connecting;
                vec![Effect::OpenTransport]
            }
            ChannelEvent::Opened => {
                if self.state != ChannelState::Connecting {
                    return vec![Effect::DropTransport];
                }
                self.state = ChannelState::Open;
                self.retries = 0;
                self.error = None;
                vec![Effect::Notify(Notice::Opened)]
            }
            ChannelEvent::Message(body) => {
                if self.state != ChannelState::Open {
                    return Vec::new();
                }
                self.receive(&body)
            }
            ChannelEvent::TransportError(reason) => self.fail(ChannelError::Transport(reason)),
            ChannelEvent::TransportClosed => self.fail(ChannelError::ClosedByServer),
            ChannelEvent::ConstructionFailed(reason) => {
                if self.state != ChannelState::Connecting {
                    return Vec::new();
                }
                let err = ChannelError::Construction(reason);
                self.state = ChannelState::Failed;
                self.error = Some(err.clone());
                vec![Effect::DropTransport, Effect::Notify(Notice::Error(err))]
            }
            ChannelEvent::RetryElapsed => {
                if !self.retry_pending || self.state != ChannelState::Closed {
                    return Vec::new();
                }
                self.retry_pending = false;
                self.state = ChannelState::Connecting;
                vec![Effect::OpenTransport]
            }
            ChannelEvent::Reconnect => {
                let mut effects = self.cancel_retry();
                effects.push(Effect::DropTransport);
                self.retries = 0;
                self.error = None;
                self.state = ChannelState::Connecting;
                effects.push(Effect::OpenTransport);
                effects
            }
            ChannelEvent::Close => {
                if self.state == ChannelState::Closed && !self.retry_pending {
                    return Vec::new();
                }
                let mut effects = self.cancel_retry();
                effects.push(Effect::DropTransport);
                self.state = ChannelState::Closed;
                effects.push(Effect::Notify(Notice::Closed));
                effects
            }
        }
    }

    fn receive(&mut self, body: &str) -> Vec<Effect> {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => {
                let record = normalize(value);
                self.data = record.clone();
                if matches!(self.error, Some(ChannelError::Parse(_))) {
                    self.error = None;
                }
                vec![Effect::Notify(Notice::Message(record))]
            }
            Err(e) => {
                let err = ChannelError::Parse(e.to_string());
                self.error = Some(err.clone());
                vec![Effect::Notify(Notice::ParseError(err))]
            }
        }
    }

    fn fail(&mut self, err: ChannelError) -> Vec<Effect> {
        if !matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            return Vec::new();
        }

        let mut effects = vec![Effect::DropTransport, Effect::Notify(Notice::Error(err.clone()))];
        self.error = Some(err);

        match self.policy.evaluate(self.retries) {
            RetryDecision::RetryAfter { delay, retries } => {
                self.retries = retries;
                self.state = ChannelState::Closed;
                self.retry_pending = true;
                effects.push(Effect::ScheduleRetry(delay));
            }
            RetryDecision::GiveUp { retries } => {
                self.retries = retries;
                self.state = ChannelState::Failed;
                let exhausted = ChannelError::RetriesExhausted {
                    attempts: self.policy.max_retries,
                };
                self.error = Some(exhausted.clone());
                effects.push(Effect::Notify(Notice::Error(exhausted)));
            }
        }
        effects
    }

    fn cancel_retry(&mut self) -> Vec<Effect> {
        if self.retry_pending {
            self.retry_pending = false;
            vec![Effect::CancelRetry]
        } else {
            Vec::new()
        }
    }
}
