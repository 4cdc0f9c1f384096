//! Subscriber lifecycle: binds one channel to one owner

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::channel::ChannelState;
use crate::client::{ChannelHandle, ChannelHandler, NoopHandler, StreamClient};
use crate::error::ChannelError;
use crate::reconnect::ReconnectPolicy;
use crate::DredgeError;

/// What the view layer renders for a subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionView {
    pub url: Option<String>,
    pub state: ChannelState,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub connected: bool,
    pub connecting: bool,
    pub loading: bool,
    pub retries: u32,
}

impl SubscriptionView {
    fn detached(url: Option<String>, state: ChannelState, error: Option<String>) -> Self {
        let loading = error.is_none();
        Self {
            url,
            state,
            data: None,
            error,
            connected: false,
            connecting: false,
            loading,
            retries: 0,
        }
    }
}

/// Owns at most one channel at a time. Dropping the subscription tears the
/// channel down.
pub struct Subscription {
    client: StreamClient,
    policy: ReconnectPolicy,
    handler: Arc<dyn ChannelHandler>,
    url: Option<String>,
    channel: Option<ChannelHandle>,
    construction_error: Option<ChannelError>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("url", &self.url)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Subscription {
    pub fn new(client: StreamClient, policy: ReconnectPolicy) -> Self {
        Self {
            client,
            policy,
            handler: Arc::new(NoopHandler),
            url: None,
            channel: None,
            construction_error: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ChannelHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Point the subscription at `url`, closing any channel it already owns
    pub fn subscribe(&mut self, url: &str) -> crate::Result<()> {
        if let Some(previous) = self.channel.take() {
            tracing::debug!("Replacing channel to {} with {}", previous.url(), url);
            previous.close();
        }
        self.url = Some(url.to_string());
        self.construction_error = None;

        match self
            .client
            .open(url, self.policy, Arc::clone(&self.handler))
        {
            Ok(handle) => {
                self.channel = Some(handle);
                Ok(())
            }
            Err(DredgeError::Construction(reason)) => {
                let err = ChannelError::Construction(reason.clone());
                self.handler.on_error(&err);
                self.construction_error = Some(err);
                Err(DredgeError::Construction(reason))
            }
            Err(e) => Err(e),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.channel.is_some()
    }

    pub fn view(&self) -> SubscriptionView {
        match &self.channel {
            Some(channel) => {
                let snapshot = channel.snapshot();
                SubscriptionView {
                    url: Some(snapshot.url.clone()),
                    state: snapshot.state,
                    connected: snapshot.connected(),
                    connecting: snapshot.connecting(),
                    loading: snapshot.loading(),
                    retries: snapshot.retries,
                    error: snapshot.error.map(|e| e.to_string()),
                    data: snapshot.data,
                }
            }
            None => match &self.construction_error {
                Some(err) => SubscriptionView::detached(
                    self.url.clone(),
                    ChannelState::Failed,
                    Some(err.to_string()),
                ),
                None if self.url.is_some() => {
                    SubscriptionView::detached(self.url.clone(), ChannelState::Closed, None)
                }
                None => SubscriptionView::detached(None, ChannelState::Idle, None),
            },
        }
    }

    /// Wait for the view to change. Returns false when there is no live
    /// channel to wait on.
    pub async fn changed(&mut self) -> bool {
        match &mut self.channel {
            Some(channel) => channel.changed().await,
            None => false,
        }
    }

    /// Cancel pending retries, reset the retry counter and reopen. A closed
    /// subscription reopens its last URL.
    pub fn reconnect(&mut self) -> crate::Result<()> {
        match &self.channel {
            Some(channel) => {
                tracing::debug!("Reconnecting {}", channel.url());
                channel.reconnect();
                Ok(())
            }
            None => match self.url.clone() {
                Some(url) => self.subscribe(&url),
                None => Ok(()),
            },
        }
    }

    /// Terminate the channel and clear everything derived from it
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.construction_error = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::transport::{Transport, TransportEvent, TransportReceiver};

    /// Accepts every connection and keeps the sending half per URL
    #[derive(Debug, Default)]
    struct AcceptingTransport {
        opened: Mutex<Vec<(String, mpsc::Sender<TransportEvent>)>>,
    }

    impl AcceptingTransport {
        fn senders_for(&self, url: &str) -> Vec<mpsc::Sender<TransportEvent>> {
            self.opened
                .lock()
                .iter()
                .filter(|(u, _)| u == url)
                .map(|(_, tx)| tx.clone())
                .collect()
        }

        fn live(&self) -> usize {
            self.opened
                .lock()
                .iter()
                .filter(|(_, tx)| !tx.is_closed())
                .count()
        }
    }

    #[async_trait]
    impl Transport for AcceptingTransport {
        async fn open(&self, url: &str) -> crate::Result<TransportReceiver> {
            let (tx, rx) = mpsc::channel(16);
            self.opened.lock().push((url.to_string(), tx));
            Ok(rx)
        }
    }

    #[derive(Debug, Default)]
    struct CountingHandler {
        messages: Mutex<u32>,
    }

    impl ChannelHandler for CountingHandler {
        fn on_message(&self, _record: Option<&Value>) {
            *self.messages.lock() += 1;
        }
    }

    fn subscription(transport: Arc<AcceptingTransport>) -> Subscription {
        Subscription::new(
            StreamClient::new(transport),
            ReconnectPolicy::new(Duration::from_millis(100), 3),
        )
    }

    async fn wait_connected(sub: &mut Subscription) {
        while !sub.view().connected {
            assert!(sub.changed().await);
        }
    }

    #[test]
    fn fresh_subscription_is_idle_and_loading() {
        let transport = Arc::new(AcceptingTransport::default());
        let client = StreamClient::new(transport);
        let sub = Subscription::new(client, ReconnectPolicy::default());
        let view = sub.view();
        assert_eq!(view.state, ChannelState::Idle);
        assert!(view.loading);
        assert!(!view.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn exposes_latest_record_and_flags() {
        let transport = Arc::new(AcceptingTransport::default());
        let mut sub = subscription(transport.clone());
        sub.subscribe("http://vessel/api/v1/suction-system").unwrap();
        assert!(sub.view().loading);

        wait_connected(&mut sub).await;
        let view = sub.view();
        assert!(view.connected);
        assert!(!view.connecting);
        assert!(!view.loading);

        transport.senders_for("http://vessel/api/v1/suction-system")[0]
            .send(TransportEvent::Message(
                r#"{"data":[{"pipe_performance":{"suction_depth":"12.4"}}]}"#.into(),
            ))
            .await
            .unwrap();
        while sub.view().data.is_none() {
            sub.changed().await;
        }
        assert_eq!(
            sub.view().data,
            Some(json!({"pipe_performance": {"suction_depth": "12.4"}}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribe_leaves_exactly_one_channel() {
        let transport = Arc::new(AcceptingTransport::default());
        let handler = Arc::new(CountingHandler::default());
        let mut sub = subscription(transport.clone()).with_handler(handler.clone());

        sub.subscribe("http://vessel/a").unwrap();
        wait_connected(&mut sub).await;
        sub.subscribe("http://vessel/b").unwrap();
        wait_connected(&mut sub).await;

        let old = transport.senders_for("http://vessel/a");
        old[0].closed().await;
        let _ = old[0].send(TransportEvent::Message("{}".into())).await;

        assert_eq!(transport.live(), 1);
        assert_eq!(transport.senders_for("http://vessel/b").len(), 1);
        assert_eq!(sub.view().url.as_deref(), Some("http://vessel/b"));
        assert_eq!(*handler.messages.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_clears_derived_state() {
        let transport = Arc::new(AcceptingTransport::default());
        let mut sub = subscription(transport.clone());
        sub.subscribe("http://vessel/a").unwrap();
        wait_connected(&mut sub).await;
        transport.senders_for("http://vessel/a")[0]
            .send(TransportEvent::Message(r#"{"rpm": 1}"#.into()))
            .await
            .unwrap();
        while sub.view().data.is_none() {
            sub.changed().await;
        }

        sub.close();
        let view = sub.view();
        assert_eq!(view.state, ChannelState::Closed);
        assert_eq!(view.data, None);
        assert!(!view.connected);
        assert!(!sub.changed().await);

        transport.senders_for("http://vessel/a")[0].closed().await;
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_close_reopens_last_url() {
        let transport = Arc::new(AcceptingTransport::default());
        let mut sub = subscription(transport.clone());
        sub.subscribe("http://vessel/a").unwrap();
        wait_connected(&mut sub).await;
        sub.close();

        sub.reconnect().unwrap();
        wait_connected(&mut sub).await;
        assert_eq!(transport.senders_for("http://vessel/a").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_subscription_closes_channel() {
        let transport = Arc::new(AcceptingTransport::default());
        let handler = Arc::new(CountingHandler::default());
        let mut sub = subscription(transport.clone()).with_handler(handler.clone());
        sub.subscribe("http://vessel/a").unwrap();
        wait_connected(&mut sub).await;

        let tx = transport.senders_for("http://vessel/a")[0].clone();
        drop(sub);
        let _ = tx.send(TransportEvent::Message("{}".into())).await;
        tx.closed().await;
        assert_eq!(*handler.messages.lock(), 0);
    }

    #[tokio::test]
    async fn empty_url_surfaces_construction_error() {
        let transport = Arc::new(AcceptingTransport::default());
        let mut sub = subscription(transport.clone());
        assert!(sub.subscribe("").is_err());

        let view = sub.view();
        assert_eq!(view.state, ChannelState::Failed);
        assert!(view.error.unwrap().starts_with("Failed to create connection"));
        assert!(!view.loading);
        assert_eq!(transport.live(), 0);
    }
}
