//! Stream client: runs a [`Channel`] state machine against a [`Transport`]
//!
//! Each opened channel gets one driver task. The task is the only place the
//! channel is mutated; open completions, inbound frames, the retry timer and
//! owner commands are fed to it one at a time, so a message is normalized and
//! delivered before the next one is looked at.

use std::cell::Cell;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelEvent, ChannelSnapshot, ChannelState, Effect, Notice};
use crate::error::ChannelError;
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Transport, TransportEvent, TransportReceiver};
use crate::DredgeError;

/// Callbacks for channel events. All methods default to doing nothing.
///
/// Callbacks run on the channel's driver task and must not block. Once the
/// channel is closed no callback fires again.
pub trait ChannelHandler: Send + Sync {
    fn on_open(&self) {}

    fn on_message(&self, _record: Option<&Value>) {}

    fn on_parse_error(&self, _error: &ChannelError) {}

    fn on_error(&self, _error: &ChannelError) {}

    fn on_close(&self) {}
}

/// Handler for owners that only read snapshots
#[derive(Debug, Default)]
pub struct NoopHandler;

impl ChannelHandler for NoopHandler {}

/// Opens channels over a shared transport
#[derive(Debug, Clone)]
pub struct StreamClient {
    transport: Arc<dyn Transport>,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Start a channel to `url`. Returns immediately; the connection is
    /// established by the channel's driver task.
    pub fn open(
        &self,
        url: &str,
        policy: ReconnectPolicy,
        handler: Arc<dyn ChannelHandler>,
    ) -> crate::Result<ChannelHandle> {
        if url.trim().is_empty() {
            return Err(DredgeError::Construction("empty URL".to_string()));
        }

        let channel = Channel::new(url, policy);
        let (snapshot_tx, snapshot_rx) = watch::channel(channel.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let gate = Arc::new(CallbackGate::new());

        let driver = Driver {
            channel,
            transport: Arc::clone(&self.transport),
            handler: Arc::clone(&handler),
            gate: Arc::clone(&gate),
            snapshots: snapshot_tx,
            opening: None,
            receiver: None,
            retry_at: None,
        };
        tokio::spawn(driver.run(command_rx, cancel.clone()));

        tracing::debug!(
            "Opened channel to {} (retry delay {:?}, max retries {})",
            url,
            policy.retry_delay(),
            policy.max_retries
        );

        Ok(ChannelHandle {
            url: url.to_string(),
            commands: command_tx,
            cancel,
            snapshots: snapshot_rx,
            handler,
            gate,
        })
    }
}

enum Command {
    Reconnect,
}

/// Owner's side of an open channel. Dropping it closes the channel.
pub struct ChannelHandle {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    snapshots: watch::Receiver<ChannelSnapshot>,
    handler: Arc<dyn ChannelHandler>,
    gate: Arc<CallbackGate>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current view of the channel
    pub fn snapshot(&self) -> ChannelSnapshot {
        let mut snapshot = self.snapshots.borrow().clone();
        if self.is_closed() {
            snapshot.state = ChannelState::Closed;
        }
        snapshot
    }

    /// Wait for the channel to change. Returns false once the driver is gone.
    pub async fn changed(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.snapshots.changed().await.is_ok()
    }

    /// Cancel any pending retry, reset the retry counter and reopen
    pub fn reconnect(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Terminate the transport and cancel any pending retry. Idempotent.
    /// No callback fires after this returns, except the single `on_close`
    /// issued from here.
    pub fn close(&self) {
        if !self.gate.shut() {
            return;
        }
        self.cancel.cancel();
        tracing::debug!("Closed channel to {}", self.url);
        self.handler.on_close();
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lets callbacks through only while the owner is attached. Reentrant so a
/// callback may close its own channel.
struct CallbackGate {
    live: ReentrantMutex<Cell<bool>>,
}

impl CallbackGate {
    fn new() -> Self {
        Self {
            live: ReentrantMutex::new(Cell::new(true)),
        }
    }

    fn run(&self, f: impl FnOnce()) {
        let live = self.live.lock();
        if live.get() {
            f();
        }
    }

    /// Close the gate, waiting out any callback in flight on another thread.
    /// Returns whether the gate was open.
    fn shut(&self) -> bool {
        let live = self.live.lock();
        live.replace(false)
    }
}

type OpenFuture = Pin<Box<dyn Future<Output = crate::Result<TransportReceiver>> + Send>>;

enum Wake {
    Cancelled,
    Command(Option<Command>),
    Opened(crate::Result<TransportReceiver>),
    Frame(Option<TransportEvent>),
    RetryElapsed,
}

struct Driver {
    channel: Channel,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ChannelHandler>,
    gate: Arc<CallbackGate>,
    snapshots: watch::Sender<ChannelSnapshot>,
    opening: Option<OpenFuture>,
    receiver: Option<TransportReceiver>,
    retry_at: Option<Instant>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        self.process(ChannelEvent::Connect);

        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                command = commands.recv() => Wake::Command(command),
                opened = finish_opening(&mut self.opening) => Wake::Opened(opened),
                frame = next_frame(&mut self.receiver) => Wake::Frame(frame),
                _ = retry_timer(self.retry_at) => Wake::RetryElapsed,
            };

            let event = match wake {
                Wake::Cancelled | Wake::Command(None) => {
                    self.process(ChannelEvent::Close);
                    break;
                }
                Wake::Command(Some(Command::Reconnect)) => ChannelEvent::Reconnect,
                Wake::Opened(result) => {
                    self.opening = None;
                    match result {
                        Ok(receiver) => {
                            self.receiver = Some(receiver);
                            ChannelEvent::Opened
                        }
                        Err(DredgeError::Construction(reason)) => {
                            ChannelEvent::ConstructionFailed(reason)
                        }
                        Err(e) => ChannelEvent::TransportError(e.to_string()),
                    }
                }
                Wake::Frame(Some(TransportEvent::Message(body))) => ChannelEvent::Message(body),
                Wake::Frame(Some(TransportEvent::Error(reason))) => {
                    ChannelEvent::TransportError(reason)
                }
                Wake::Frame(None) => ChannelEvent::TransportClosed,
                Wake::RetryElapsed => {
                    self.retry_at = None;
                    ChannelEvent::RetryElapsed
                }
            };
            self.process(event);
        }

        tracing::debug!("Channel driver for {} stopped", self.channel.url());
    }

    fn process(&mut self, event: ChannelEvent) {
        tracing::trace!(
            "Channel {} in state {} handling {:?}",
            self.channel.url(),
            self.channel.state(),
            event
        );
        for effect in self.channel.apply(event) {
            self.execute(effect);
        }

        let next = self.channel.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport => {
                let transport = Arc::clone(&self.transport);
                let url = self.channel.url().to_string();
                tracing::debug!("Connecting to {}", url);
                self.opening = Some(Box::pin(async move { transport.open(&url).await }));
            }
            Effect::DropTransport => {
                self.opening = None;
                self.receiver = None;
            }
            Effect::ScheduleRetry(delay) => {
                tracing::info!(
                    "Reconnecting to {} in {:?} (attempt {}/{})",
                    self.channel.url(),
                    delay,
                    self.channel.retries(),
                    self.channel.policy().max_retries
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            Effect::CancelRetry => {
                self.retry_at = None;
            }
            Effect::Notify(notice) => self.notify(notice),
        }
    }

    fn notify(&self, notice: Notice) {
        let url = self.channel.url();
        match &notice {
            Notice::Opened => tracing::info!("Channel to {} open", url),
            Notice::Message(_) => tracing::trace!("Message on {}", url),
            Notice::ParseError(e) => tracing::warn!("Bad message on {}: {}", url, e),
            Notice::Error(e) if e.is_fatal() => tracing::error!("Channel to {} failed: {}", url, e),
            Notice::Error(e) => tracing::warn!("Channel to {}: {}", url, e),
            Notice::Closed => tracing::debug!("Channel to {} closed", url),
        }

        let handler = &self.handler;
        self.gate.run(|| match &notice {
            Notice::Opened => handler.on_open(),
            Notice::Message(record) => handler.on_message(record.as_ref()),
            Notice::ParseError(e) => handler.on_parse_error(e),
            Notice::Error(e) => handler.on_error(e),
            Notice::Closed => handler.on_close(),
        });
    }
}

async fn finish_opening(opening: &mut Option<OpenFuture>) -> crate::Result<TransportReceiver> {
    match opening {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_frame(receiver: &mut Option<TransportReceiver>) -> Option<TransportEvent> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => pending().await,
    }
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
