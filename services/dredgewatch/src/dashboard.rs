//! Status API with JSON endpoints over the shared feed state

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::api::DredgeApi;
use crate::refresh::ForceRefreshService;
use crate::state::StateHandle;

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub state: StateHandle,
    pub api: Option<DredgeApi>,
    pub refresh: Option<Arc<ForceRefreshService>>,
}

impl DashboardState {
    pub fn new(state: StateHandle) -> Self {
        Self {
            state,
            api: None,
            refresh: None,
        }
    }

    pub fn with_api(mut self, api: DredgeApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_refresh(mut self, refresh: Arc<ForceRefreshService>) -> Self {
        self.refresh = Some(refresh);
        self
    }
}

/// Build the dashboard axum router
pub fn build_router(dashboard: DashboardState) -> Router {
    Router::new()
        .route("/api/feeds", get(feeds_handler))
        .route("/api/feeds/{name}", get(feed_handler))
        .route("/api/refresh", get(refresh_status_handler).post(refresh_handler))
        .route("/api/background-status", get(background_status_handler))
        .route(
            "/api/background-processing",
            axum::routing::post(background_processing_handler),
        )
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(dashboard)
}

async fn feeds_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    Json(state.feeds.clone())
}

async fn feed_handler(
    State(dashboard): State<DashboardState>,
    Path(name): Path<String>,
) -> Response {
    let state = dashboard.state.read().await;
    match state.feed(&name) {
        Some(feed) => Json(feed.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown feed '{}'", name)),
    }
}

async fn refresh_status_handler(State(dashboard): State<DashboardState>) -> impl IntoResponse {
    let state = dashboard.state.read().await;
    Json(state.refresh.clone())
}

async fn refresh_handler(State(dashboard): State<DashboardState>) -> Response {
    let Some(refresh) = dashboard.refresh else {
        return unavailable("force-refresh");
    };
    match refresh.refresh_now().await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn background_status_handler(State(dashboard): State<DashboardState>) -> Response {
    let Some(api) = dashboard.api else {
        return unavailable("backend API");
    };
    match api.background_status().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn background_processing_handler(State(dashboard): State<DashboardState>) -> Response {
    let Some(api) = dashboard.api else {
        return unavailable("backend API");
    };
    match api.force_background_processing().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

fn unavailable(what: &str) -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("{} is not configured", what),
    )
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
