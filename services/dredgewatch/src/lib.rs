//! Dredgewatch - real-time data channel for the dredging-vessel dashboard
//!
//! Subscribes to the vessel backend's server-push feeds, keeps each feed
//! connected with bounded retries, normalizes records and serves the latest
//! state over a small JSON API.

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod io;
pub mod normalize;
pub mod poller;
pub mod reconnect;
pub mod records;
pub mod refresh;
pub mod sse;
pub mod state;
pub mod subscription;
pub mod transport;

pub use config::{load_config, Config};
pub use error::{ChannelError, DredgeError, Result};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::DredgeApi;
use crate::client::StreamClient;
use crate::config::FeedConfig;
use crate::dashboard::DashboardState;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::poller::{poll_loop, PollFeed};
use crate::reconnect::ReconnectPolicy;
use crate::refresh::ForceRefreshService;
use crate::state::{current_epoch_ms, FeedStatus, StateHandle};
use crate::subscription::Subscription;
use crate::transport::{SseTransport, Transport};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the dredgewatch service with the given configuration until ctrl-c
pub async fn run(config: Config) -> Result<()> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_timeout(HTTP_TIMEOUT)?);
    let transport: Arc<dyn Transport> = Arc::new(SseTransport::new());
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        cancel_for_signal.cancel();
    });

    serve(config, http, transport, cancel).await
}

/// Run the service over the given HTTP client and transport until `cancel`
/// fires
pub async fn serve(
    config: Config,
    http: Arc<dyn HttpClient>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) -> Result<()> {
    config.validate()?;

    let api = DredgeApi::new(config.api_base_url.clone(), http);
    let statuses = config
        .feeds
        .iter()
        .map(|feed| FeedStatus::new(feed.name(), api.url(feed.path()), feed.mode_name()))
        .collect();
    let state = state::new_state_handle(statuses, config.force_refresh.interval_seconds);
    let client = StreamClient::new(transport);

    let mut handles = Vec::new();
    for feed in &config.feeds {
        let url = api.url(feed.path());
        let handle = match feed {
            FeedConfig::Stream { name, .. } => tokio::spawn(mirror_stream(
                client.clone(),
                feed.policy(&config.reconnect),
                name.clone(),
                url,
                Arc::clone(&state),
                cancel.clone(),
            )),
            FeedConfig::Poll {
                name,
                path,
                polling_interval_seconds,
            } => tokio::spawn(poll_loop(
                api.clone(),
                PollFeed {
                    name: name.clone(),
                    path: path.clone(),
                    interval: Duration::from_secs(*polling_interval_seconds),
                },
                Arc::clone(&state),
                cancel.clone(),
            )),
        };
        handles.push(handle);
    }

    let refresh = Arc::new(ForceRefreshService::new(
        api.clone(),
        Duration::from_secs(config.force_refresh.interval_seconds),
        Arc::clone(&state),
    ));
    if config.force_refresh.enabled {
        refresh.start();
    }

    if config.dashboard.enabled {
        let dashboard_port = config.dashboard.port;
        let dashboard_state = DashboardState::new(Arc::clone(&state))
            .with_api(api.clone())
            .with_refresh(Arc::clone(&refresh));
        let cancel_for_dashboard = cancel.clone();

        tokio::spawn(async move {
            let router = dashboard::build_router(dashboard_state);
            let addr = SocketAddr::from(([0, 0, 0, 0], dashboard_port));
            tracing::info!("Status API listening on http://{}", addr);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind status API to port {}: {}. Continuing without it.",
                        dashboard_port,
                        e
                    );
                    return;
                }
            };

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_dashboard.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("Status API stopped");
        });
    }

    tracing::info!(
        "Dredgewatch started with {} feeds against {}",
        config.feeds.len(),
        config.api_base_url
    );

    cancel.cancelled().await;

    refresh.stop();
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("Dredgewatch stopped");

    Ok(())
}

/// Keep one subscription to `url` alive and copy every view change into
/// shared state until cancelled
async fn mirror_stream(
    client: StreamClient,
    policy: ReconnectPolicy,
    name: String,
    url: String,
    state: StateHandle,
    cancel: CancellationToken,
) {
    let mut subscription = Subscription::new(client, policy);
    if let Err(e) = subscription.subscribe(&url) {
        tracing::error!("Feed '{}' could not be opened: {}", name, e);
    }

    loop {
        let view = subscription.view();
        let changed = state
            .write()
            .await
            .apply_view(&name, &view, current_epoch_ms());
        if changed {
            tracing::trace!("Feed '{}' received a new record", name);
        }

        tokio::select! {
            alive = subscription.changed() => {
                if !alive {
                    cancel.cancelled().await;
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    subscription.close();
    let view = subscription.view();
    state
        .write()
        .await
        .apply_view(&name, &view, current_epoch_ms());
    tracing::debug!("Feed '{}' closed", name);
}
