//! BDD step definitions for stream channel feature

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};
use serde_json::Value;

use dredgewatch::channel::ChannelState;
use dredgewatch::client::StreamClient;
use dredgewatch::reconnect::ReconnectPolicy;
use dredgewatch::subscription::{Subscription, SubscriptionView};
use dredgewatch::transport::TransportEvent;

use crate::world::{CallbackLog, DredgeWorld, InMemoryServer};

const STREAM_URL: &str = "http://vessel/api/v1/engine-propulsion/stream";
const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn server(world: &DredgeWorld) -> Arc<InMemoryServer> {
    Arc::clone(world.server.as_ref().expect("event stream not set"))
}

fn view(world: &DredgeWorld) -> SubscriptionView {
    world
        .subscription
        .as_ref()
        .expect("subscription not opened")
        .view()
}

/// Wait until the subscription's view satisfies `done`
async fn wait_for(world: &mut DredgeWorld, what: &str, done: impl Fn(&SubscriptionView) -> bool) {
    let subscription = world
        .subscription
        .as_mut()
        .expect("subscription not opened");
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let current = subscription.view();
        if done(&current) {
            return;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, subscription.changed()).await {
            Ok(true) => {}
            Ok(false) => panic!("subscription ended while waiting for {what}: {current:?}"),
            Err(_) => panic!("timed out waiting for {what}: {current:?}"),
        }
    }
}

fn open_subscription(world: &mut DredgeWorld, url: &str, policy: ReconnectPolicy) {
    let client = StreamClient::new(server(world));
    let callbacks = Arc::clone(world.callbacks.as_ref().expect("callbacks not set"));
    let mut subscription = Subscription::new(client, policy).with_handler(callbacks);
    world.subscribe_result = Some(subscription.subscribe(url));
    world.subscription = Some(subscription);
}

#[given("a vessel event stream")]
fn vessel_event_stream(world: &mut DredgeWorld) {
    world.server = Some(Arc::new(InMemoryServer::default()));
    world.callbacks = Some(Arc::new(CallbackLog::default()));
}

#[given("the event stream refuses connections")]
fn stream_refuses(world: &mut DredgeWorld) {
    server(world).refuse.store(true, Ordering::SeqCst);
}

#[when("the event stream accepts connections again")]
fn stream_accepts(world: &mut DredgeWorld) {
    server(world).refuse.store(false, Ordering::SeqCst);
}

#[when(expr = "a subscription is opened with a {int} ms retry delay and {int} retries")]
fn subscription_opened(world: &mut DredgeWorld, delay_ms: u64, max_retries: u32) {
    let policy = ReconnectPolicy::new(Duration::from_millis(delay_ms), max_retries);
    open_subscription(world, STREAM_URL, policy);
}

#[when("a subscription is opened to an empty URL")]
fn subscription_opened_empty(world: &mut DredgeWorld) {
    open_subscription(world, "", ReconnectPolicy::default());
}

#[when("the subscription becomes connected")]
#[then("the subscription becomes connected")]
async fn subscription_connected(world: &mut DredgeWorld) {
    wait_for(world, "connection", |v| v.connected).await;
}

#[when(regex = r"^the server sends (.+)$")]
async fn server_sends(world: &mut DredgeWorld, body: String) {
    let connection = server(world).latest().expect("no connection to send on");
    connection
        .send(TransportEvent::Message(body))
        .await
        .expect("connection closed");
}

#[when("the subscription is reconnected")]
fn subscription_reconnected(world: &mut DredgeWorld) {
    world
        .subscription
        .as_mut()
        .expect("subscription not opened")
        .reconnect()
        .expect("reconnect failed");
}

#[when("the subscription is closed")]
fn subscription_closed(world: &mut DredgeWorld) {
    world
        .subscription
        .as_mut()
        .expect("subscription not opened")
        .close();
}

#[when(expr = "the subscription fails with {string}")]
#[then(expr = "the subscription fails with {string}")]
async fn subscription_fails(world: &mut DredgeWorld, message: String) {
    wait_for(world, "failure", |v| v.state == ChannelState::Failed).await;
    assert_eq!(view(world).error.as_deref(), Some(message.as_str()));
}

#[then(regex = r"^the latest record is (.+)$")]
async fn latest_record_is(world: &mut DredgeWorld, record: String) {
    let expected: Value = serde_json::from_str(&record).expect("invalid JSON in feature file");
    wait_for(world, "record", |v| v.data.as_ref() == Some(&expected)).await;
}

#[then(expr = "the subscription error starts with {string}")]
async fn error_starts_with(world: &mut DredgeWorld, prefix: String) {
    if world.subscription.as_ref().is_some_and(|s| s.is_subscribed()) {
        wait_for(world, "error", |v| v.error.is_some()).await;
    }
    let error = view(world).error.expect("no error recorded");
    assert!(
        error.starts_with(&prefix),
        "Expected error starting with '{}', got '{}'",
        prefix,
        error
    );
}

#[then("the subscription is connected")]
fn is_connected(world: &mut DredgeWorld) {
    assert!(view(world).connected);
}

#[then("the subscription is not loading")]
fn not_loading(world: &mut DredgeWorld) {
    assert!(!view(world).loading);
}

#[then("the subscription has no error")]
fn no_error(world: &mut DredgeWorld) {
    assert_eq!(view(world).error, None);
}

#[then("subscribing fails")]
fn subscribing_fails(world: &mut DredgeWorld) {
    let result = world.subscribe_result.as_ref().expect("not subscribed");
    assert!(result.is_err());
}

#[then(expr = "the callbacks include {string}")]
fn callbacks_include(world: &mut DredgeWorld, entry: String) {
    let callbacks = world.callbacks.as_ref().expect("callbacks not set");
    assert!(
        callbacks.contains(&entry),
        "callbacks were {:?}",
        callbacks.events.lock()
    );
}

#[then(expr = "no callback follows {string}")]
async fn no_callback_follows(world: &mut DredgeWorld, entry: String) {
    if let Some(connection) = server(world).latest() {
        let _ = connection
            .send(TransportEvent::Message(r#"{"late": true}"#.to_string()))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let callbacks = world.callbacks.as_ref().expect("callbacks not set");
    let events = callbacks.events.lock();
    assert_eq!(events.last(), Some(&entry), "callbacks were {:?}", *events);
    assert_eq!(events.iter().filter(|e| **e == entry).count(), 1);
}

#[then(expr = "the server saw {int} connection attempts")]
async fn server_saw_attempts(world: &mut DredgeWorld, attempts: u32) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server(world).attempts.load(Ordering::SeqCst), attempts);
}

#[then("the server has no live connections")]
async fn no_live_connections(world: &mut DredgeWorld) {
    let server = server(world);
    let released = tokio::time::timeout(WAIT_LIMIT, async {
        while server.live_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "connection still open after close");
}
