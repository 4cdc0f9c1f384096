//! Configuration types for the dredgewatch service

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::Subsystem;
use crate::reconnect::ReconnectPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub force_refresh: ForceRefreshConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            reconnect: ReconnectPolicy::default(),
            feeds: default_feeds(),
            force_refresh: ForceRefreshConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Feed configuration, tagged by how records are obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum FeedConfig {
    /// Server-push event stream with reconnection
    #[serde(rename = "stream")]
    Stream {
        name: String,
        path: String,
        #[serde(default)]
        retry_delay_ms: Option<u64>,
        #[serde(default)]
        max_retries: Option<u32>,
    },
    /// Periodic request/response fetch
    #[serde(rename = "poll")]
    Poll {
        name: String,
        path: String,
        #[serde(default = "default_polling_interval")]
        polling_interval_seconds: u64,
    },
}

impl FeedConfig {
    pub fn name(&self) -> &str {
        match self {
            FeedConfig::Stream { name, .. } | FeedConfig::Poll { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FeedConfig::Stream { path, .. } | FeedConfig::Poll { path, .. } => path,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            FeedConfig::Stream { .. } => "stream",
            FeedConfig::Poll { .. } => "poll",
        }
    }

    /// The reconnection policy for a stream feed, falling back to `defaults`
    pub fn policy(&self, defaults: &ReconnectPolicy) -> ReconnectPolicy {
        match self {
            FeedConfig::Stream {
                retry_delay_ms,
                max_retries,
                ..
            } => ReconnectPolicy {
                retry_delay_ms: retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
                max_retries: max_retries.unwrap_or(defaults.max_retries),
            },
            FeedConfig::Poll { .. } => *defaults,
        }
    }
}

/// Periodic force-refresh of backend records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceRefreshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval")]
    pub interval_seconds: u64,
}

impl Default for ForceRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_refresh_interval(),
        }
    }
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
        }
    }
}

impl Config {
    /// Reject configurations the service cannot run
    pub fn validate(&self) -> crate::Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(crate::DredgeError::Config(
                "api_base_url must not be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if !names.insert(feed.name()) {
                return Err(crate::DredgeError::Config(format!(
                    "Duplicate feed name '{}'",
                    feed.name()
                )));
            }
            if feed.path().trim().is_empty() {
                return Err(crate::DredgeError::Config(format!(
                    "Feed '{}' has an empty path",
                    feed.name()
                )));
            }
            if let FeedConfig::Poll {
                polling_interval_seconds: 0,
                ..
            } = feed
            {
                return Err(crate::DredgeError::Config(format!(
                    "Feed '{}' has a zero polling interval",
                    feed.name()
                )));
            }
        }

        if self.force_refresh.enabled && self.force_refresh.interval_seconds == 0 {
            return Err(crate::DredgeError::Config(
                "force_refresh.interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8005/api/v1".to_string()
}

fn default_feeds() -> Vec<FeedConfig> {
    Subsystem::ALL
        .iter()
        .map(|subsystem| FeedConfig::Stream {
            name: subsystem.to_string(),
            path: subsystem.path().to_string(),
            retry_delay_ms: None,
            max_retries: None,
        })
        .collect()
}

fn default_polling_interval() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::DredgeError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
