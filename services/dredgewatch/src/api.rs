//! Client for the vessel backend's request/response endpoints

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::io::{HttpClient, HttpResponse};
use crate::normalize::normalize_latest;
use crate::records::SubsystemRecord;
use crate::DredgeError;

/// Subsystems the backend publishes records for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subsystem {
    Dashboard,
    EnginePropulsion,
    SuctionSystem,
    PredictiveAnalysis,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Dashboard,
        Subsystem::EnginePropulsion,
        Subsystem::SuctionSystem,
        Subsystem::PredictiveAnalysis,
    ];

    /// Endpoint path relative to the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            Subsystem::Dashboard => "dashboard",
            Subsystem::EnginePropulsion => "engine-propulsion",
            Subsystem::SuctionSystem => "suction-system",
            Subsystem::PredictiveAnalysis => "predictive-analysis",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Body returned by `POST force-refresh`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceRefreshResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: f64,
}

/// Resolve `path` against `base_url` unless it is already absolute
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Typed access to the backend's REST endpoints
#[derive(Clone)]
pub struct DredgeApi {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl fmt::Debug for DredgeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DredgeApi")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DredgeApi {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        resolve_url(&self.base_url, path)
    }

    /// Fetch the newest record published at `path`
    pub async fn fetch_record(&self, path: &str) -> crate::Result<Value> {
        let url = self.url(path);
        let response = self.http.get(&url).await?;
        let body = decode_body(&url, &response)?;
        normalize_latest(body)
            .ok_or_else(|| DredgeError::Api(format!("No data received from API ({})", url)))
    }

    /// Fetch the newest record at `path` and deserialize it as `T`
    pub async fn fetch_typed<T: DeserializeOwned>(&self, path: &str) -> crate::Result<T> {
        let record = self.fetch_record(path).await?;
        Ok(serde_json::from_value(record)?)
    }

    /// Fetch the newest record of the subsystem `R` belongs to
    pub async fn fetch_subsystem<R: SubsystemRecord>(&self) -> crate::Result<R> {
        self.fetch_typed(R::SUBSYSTEM.path()).await
    }

    /// Ask the backend to recompute all subsystem records now
    pub async fn force_refresh(&self) -> crate::Result<ForceRefreshResponse> {
        let url = self.url("force-refresh");
        let response = self.http.post_json(&url).await?;
        let body = decode_body(&url, &response)?;
        Ok(serde_json::from_value(body)?)
    }

    /// Kick off the backend's background processing (live mode)
    pub async fn force_background_processing(&self) -> crate::Result<Value> {
        let url = self.url("force-background-processing");
        let response = self.http.post_json(&url).await?;
        decode_body(&url, &response)
    }

    /// Status of the backend's background processing
    pub async fn background_status(&self) -> crate::Result<Value> {
        let url = self.url("background-status");
        let response = self.http.get(&url).await?;
        decode_body(&url, &response)
    }
}

fn decode_body(url: &str, response: &HttpResponse) -> crate::Result<Value> {
    if !response.is_success() {
        return Err(DredgeError::Api(format!(
            "{} returned status {}: {}",
            url,
            response.status,
            error_detail(&response.body)
        )));
    }
    Ok(serde_json::from_str(&response.body)?)
}

/// The backend reports failures as `{"detail": "..."}`; fall back to the raw body
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
