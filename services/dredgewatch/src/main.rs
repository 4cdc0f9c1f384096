//! Dredgewatch CLI
//!
//! Command-line interface for the dredging-vessel data channel service.

use std::path::PathBuf;

use clap::Parser;
use dredgewatch::{load_config, Config};
use tracing::Level;

#[derive(Parser)]
#[command(name = "dredgewatch")]
#[command(about = "Real-time data channel for the dredging-vessel dashboard")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend API base URL (overrides config file)
    #[arg(long)]
    api_base_url: Option<String>,

    /// Status API port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, api_base_url={:?}, dashboard_port={:?}, log_level={:?}",
        args.config,
        args.api_base_url,
        args.dashboard_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(api_base_url) = args.api_base_url {
        config.api_base_url = api_base_url;
    }
    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    tracing::info!("Starting dredgewatch service");
    tracing::debug!(
        "Feeds: {}, force refresh: {}, retry delay: {}ms, max retries: {}",
        config.feeds.len(),
        config.force_refresh.enabled,
        config.reconnect.retry_delay_ms,
        config.reconnect.max_retries
    );

    dredgewatch::run(config).await?;

    Ok(())
}
