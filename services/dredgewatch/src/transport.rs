//! Server-push transport abstraction and the reqwest SSE implementation

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Url;
use tokio::sync::mpsc;

use crate::sse::SseDecoder;
use crate::DredgeError;

/// Frames buffered between the reader task and the channel driver
const FRAME_BUFFER: usize = 64;

/// Something the transport observed on an established connection.
/// The end of the receiver means the connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Error(String),
}

/// Receiving half of an established connection. Dropping it tears the
/// connection down.
pub type TransportReceiver = mpsc::Receiver<TransportEvent>;

/// Opens long-lived server-push connections
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Establish a connection to `url`.
    ///
    /// Returns [`DredgeError::Construction`] when the connection cannot be
    /// created at all, and any other error for a failed attempt worth retrying.
    async fn open(&self, url: &str) -> crate::Result<TransportReceiver>;
}

/// Production transport speaking `text/event-stream` over reqwest
#[derive(Debug, Default, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, url: &str) -> crate::Result<TransportReceiver> {
        let parsed = Url::parse(url)
            .map_err(|e| DredgeError::Construction(format!("invalid URL '{}': {}", url, e)))?;

        tracing::debug!("Opening event stream {}", parsed);
        let mut response = self
            .client
            .get(parsed)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| DredgeError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DredgeError::Http(format!(
                "GET {} returned status {}",
                url, status
            )));
        }
        tracing::debug!("Event stream {} established ({})", url, status);

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let url = url.to_string();
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("Event stream {} dropped by receiver", url);
                        return;
                    }
                    chunk = response.chunk() => chunk,
                };

                match chunk {
                    Ok(Some(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            if !event.is_message() {
                                tracing::trace!("Skipping named event {:?} on {}", event.event, url);
                                continue;
                            }
                            if tx.send(TransportEvent::Message(event.data)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Event stream {} ended", url);
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
