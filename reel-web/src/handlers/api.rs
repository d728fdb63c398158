//! JSON API handlers for catalog and transfer statistics

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use reel_core::streaming::StreamStatsSnapshot;
use reel_core::{Catalog, ContentLocator};
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;

/// Catalog entry as reported to API clients.
#[derive(Debug, Serialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: String,
    pub media_type: String,
    pub added_at: DateTime<Utc>,
    /// Current file size; absent when the file is unavailable
    pub size: Option<u64>,
    pub available: bool,
    pub stream_url: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogListing {
    pub entries: Vec<CatalogItem>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub streams: StreamStatsSnapshot,
    pub catalog_entries: usize,
    pub uptime_seconds: u64,
}

/// Picks up entries written by other processes before reporting.
async fn refresh_catalog(catalog: &Catalog) {
    if let Err(e) = catalog.refresh().await {
        warn!("Reporting previous catalog snapshot, reload failed: {e}");
    }
}

/// `GET /api/catalog`
pub async fn api_catalog(State(state): State<AppState>) -> Json<CatalogListing> {
    refresh_catalog(&state.catalog).await;

    let mut entries = Vec::new();
    for entry in state.catalog.entries() {
        let size = state
            .catalog
            .locate(&entry.id)
            .await
            .ok()
            .map(|content| content.total_length);

        entries.push(CatalogItem {
            stream_url: format!("/stream/{}", entry.id),
            available: size.is_some(),
            size,
            id: entry.id,
            title: entry.title,
            category: entry.category,
            description: entry.description,
            media_type: entry.media_type,
            added_at: entry.added_at,
        });
    }

    let total = entries.len();
    Json(CatalogListing { entries, total })
}

/// `GET /api/stats`
pub async fn api_stats(State(state): State<AppState>) -> Json<ServerStats> {
    refresh_catalog(&state.catalog).await;
    Json(ServerStats {
        streams: state.responder.stats().snapshot(),
        catalog_entries: state.catalog.snapshot().len(),
        uptime_seconds: state.server_started_at.elapsed().as_secs(),
    })
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
