//! rankcast-rp library - rank predictor HTTP service
//!
//! Serves rank/percentile predictions from stored score distributions and the
//! admin endpoints that replace those distributions.

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::map_response_body::MapResponseBodyLayer;
use tower_http::trace::TraceLayer;

use rankcast_common::{
    DistributionCache, DistributionRepository, DistributionStore, IngestionGate,
    PredictionService,
};

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub predictor: PredictionService,
    pub gate: IngestionGate,
    pub cache: Arc<DistributionCache>,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the repository, prediction service and ingestion gate around one
    /// store and one cache
    pub fn new(
        store: Arc<dyn DistributionStore>,
        cache: Arc<DistributionCache>,
        max_upload_bytes: usize,
    ) -> Self {
        let repository = DistributionRepository::new(Arc::clone(&store), Arc::clone(&cache));
        Self {
            predictor: PredictionService::new(repository),
            gate: IngestionGate::new(store, cache.clone()),
            cache,
            max_upload_bytes,
        }
    }

    pub fn repository(&self) -> &DistributionRepository {
        self.predictor.repository()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::predict_routes())
        .merge(api::admin_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(state)
}
