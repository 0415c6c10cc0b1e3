//! HTTP front for batch checks.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::crawler::{split_targets, BatchResult, FetchOrchestrator};
use crate::error::ScrapeError;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FetchOrchestrator>,
}

/// Query string of `/api/status`. `urls` wins when both are given.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub url: Option<String>,
    pub urls: Option<String>,
}

impl StatusQuery {
    fn targets(&self) -> Vec<String> {
        match (&self.urls, &self.url) {
            (Some(urls), _) if !urls.trim().is_empty() => split_targets(&[urls]),
            (_, Some(url)) if !url.trim().is_empty() => vec![url.trim().to_string()],
            _ => Vec::new(),
        }
    }
}

pub fn build_app(orchestrator: Arc<FetchOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { orchestrator })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Per-target failures still answer 200; only a batch that never ran is 503.
async fn status_handler(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    let targets = query.targets();
    if targets.is_empty() {
        return Json(BatchResult::no_targets()).into_response();
    }

    match state.orchestrator.scrape_many(&targets).await {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => {
            error!("Batch failed: {}", e);
            let status = match e {
                ScrapeError::SessionInit(_) | ScrapeError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
