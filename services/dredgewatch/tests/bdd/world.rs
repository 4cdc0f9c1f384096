//! BDD test world for dredgewatch service

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cucumber::World;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use dredgewatch::client::ChannelHandler;
use dredgewatch::reconnect::{ReconnectPolicy, RetryDecision};
use dredgewatch::state::StateHandle;
use dredgewatch::subscription::Subscription;
use dredgewatch::transport::{Transport, TransportEvent, TransportReceiver};
use dredgewatch::{ChannelError, DredgeError};

/// In-process stand-in for the vessel's event-stream endpoint
#[derive(Debug, Default)]
pub struct InMemoryServer {
    pub refuse: AtomicBool,
    pub attempts: AtomicU32,
    pub connections: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl InMemoryServer {
    pub fn latest(&self) -> Option<mpsc::Sender<TransportEvent>> {
        self.connections.lock().last().cloned()
    }

    pub fn live_connections(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

#[async_trait]
impl Transport for InMemoryServer {
    async fn open(&self, _url: &str) -> dredgewatch::Result<TransportReceiver> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DredgeError::Http("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        self.connections.lock().push(tx);
        Ok(rx)
    }
}

/// Records every callback the channel makes, in order
#[derive(Debug, Default)]
pub struct CallbackLog {
    pub events: Mutex<Vec<String>>,
}

impl CallbackLog {
    pub fn contains(&self, entry: &str) -> bool {
        self.events.lock().iter().any(|e| e == entry)
    }
}

impl ChannelHandler for CallbackLog {
    fn on_open(&self) {
        self.events.lock().push("open".to_string());
    }

    fn on_message(&self, record: Option<&Value>) {
        let text = record.map_or("null".to_string(), Value::to_string);
        self.events.lock().push(format!("message {}", text));
    }

    fn on_parse_error(&self, error: &ChannelError) {
        self.events.lock().push(format!("parse error: {}", error));
    }

    fn on_error(&self, error: &ChannelError) {
        self.events.lock().push(format!("error: {}", error));
    }

    fn on_close(&self) {
        self.events.lock().push("close".to_string());
    }
}

#[derive(Debug, Default, World)]
pub struct DredgeWorld {
    // Normalizer testing
    pub raw_response: Option<Value>,
    pub normalized: Option<Option<Value>>,

    // Reconnection policy testing
    pub policy: Option<ReconnectPolicy>,
    pub decision: Option<RetryDecision>,

    // Stream channel testing
    pub server: Option<Arc<InMemoryServer>>,
    pub callbacks: Option<Arc<CallbackLog>>,
    pub subscription: Option<Subscription>,
    pub subscribe_result: Option<dredgewatch::Result<()>>,

    // Status API testing
    pub status_state: Option<StateHandle>,
    pub response_status: Option<u16>,
    pub response_body: Option<Value>,
}
