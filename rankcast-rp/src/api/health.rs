//! GET /health: liveness plus a snapshot of the distribution cache

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Backing store in use, as the store describes itself
    pub store: String,
    /// Distributions currently held in memory
    pub cache_entries: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "rankcast-rp",
        version: env!("CARGO_PKG_VERSION"),
        store: state.repository().store().describe(),
        cache_entries: state.cache.len().await,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
