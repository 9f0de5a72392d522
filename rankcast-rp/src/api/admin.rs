//! Admin endpoints: upload, delete and inspect stored distributions
//!
//! Uploads are read as raw bytes so a malformed body produces the same JSON
//! error shape as every other failure. A body is JSON or a `score,count` CSV
//! table, chosen by `Content-Type`; without one, JSON is tried first.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use rankcast_common::cache::CacheStats;
use rankcast_common::delimited::{has_bucket_columns, parse_csv};
use rankcast_common::{Category, DistributionKey, IngestReceipt, Invalidate};

use super::ApiError;
use crate::AppState;

/// `?category=` on distribution routes
#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

/// Body of POST /api/admin/cache/invalidate
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    pub year: Option<i32>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoredDistribution {
    pub year: i32,
    pub category: Category,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct DistributionListing {
    pub distributions: Vec<StoredDistribution>,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct AdminAck {
    pub ok: bool,
    /// `year/CATEGORY`, or `all`
    pub scope: String,
}

/// GET /api/admin/distributions
pub async fn list_distributions(
    State(state): State<AppState>,
) -> Result<Json<DistributionListing>, ApiError> {
    let stored = state.repository().available().await?;
    let cached = state.cache.keys().await;

    let distributions = stored
        .into_iter()
        .map(|key| StoredDistribution {
            cached: cached.binary_search(&key).is_ok(),
            year: key.year,
            category: key.category,
        })
        .collect();

    Ok(Json(DistributionListing {
        distributions,
        cache: state.cache.stats().await,
    }))
}

/// Body encoding declared by an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Json,
    Csv,
    /// No usable `Content-Type`
    Undeclared,
}

impl UploadFormat {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
            return UploadFormat::Undeclared;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" => UploadFormat::Csv,
            e if e == "application/json" || e.ends_with("+json") => UploadFormat::Json,
            _ => UploadFormat::Undeclared,
        }
    }
}

/// Decode an upload body into the payload tree the ingestion gate validates
pub fn decode_upload(format: UploadFormat, body: &[u8]) -> Result<Value, ApiError> {
    let json = || {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("Upload is not valid JSON: {}", e)))
    };
    let csv = || {
        parse_csv(body)
            .map_err(|e| ApiError::bad_request(format!("Upload is not valid CSV: {}", e)))
    };

    match format {
        UploadFormat::Json => json(),
        UploadFormat::Csv => csv(),
        UploadFormat::Undeclared => match serde_json::from_slice(body) {
            Ok(payload) => Ok(payload),
            Err(_) if has_bucket_columns(body) => csv(),
            Err(e) => Err(ApiError::bad_request(format!(
                "Upload is neither JSON nor a score,count CSV table: {}",
                e
            ))),
        },
    }
}

/// PUT /api/admin/distributions/:year?category=
///
/// Body is the distribution payload in any accepted upload shape, or a CSV
/// table with `score` and `count` columns.
pub async fn upload_distribution(
    State(state): State<AppState>,
    year: Result<Path<i32>, PathRejection>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<IngestReceipt>, ApiError> {
    let Path(year) = year?;
    let Query(query) = query?;
    let body = body?;

    let format = UploadFormat::from_headers(&headers);
    let payload = decode_upload(format, &body)?;

    let receipt = state
        .gate
        .ingest(year, query.category.as_deref(), &payload)
        .await?;
    Ok(Json(receipt))
}

/// DELETE /api/admin/distributions/:year?category=
pub async fn delete_distribution(
    State(state): State<AppState>,
    year: Result<Path<i32>, PathRejection>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> Result<Json<AdminAck>, ApiError> {
    let Path(year) = year?;
    let Query(query) = query?;

    let key = state.gate.delete(year, query.category.as_deref()).await?;
    Ok(Json(AdminAck {
        ok: true,
        scope: key.to_string(),
    }))
}

/// POST /api/admin/cache/invalidate
///
/// No year drops every entry; a year (with optional category) drops one key.
pub async fn invalidate_cache(
    State(state): State<AppState>,
    body: Result<Json<InvalidateRequest>, JsonRejection>,
) -> Result<Json<AdminAck>, ApiError> {
    let Json(request) = body?;

    let scope = match request.year {
        None => {
            if request.category.is_some() {
                return Err(ApiError::bad_request(
                    "category given without a year; omit both to invalidate everything",
                ));
            }
            state.cache.invalidate_all().await;
            "all".to_string()
        }
        Some(year) => {
            let category = Category::from_option(request.category.as_deref())?;
            let key = DistributionKey::new(year, category)?;
            state.cache.invalidate(&key).await;
            key.to_string()
        }
    };

    info!(%scope, "Cache invalidated by admin request");
    Ok(Json(AdminAck { ok: true, scope }))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/distributions", get(list_distributions))
        .route(
            "/api/admin/distributions/:year",
            put(upload_distribution).delete(delete_distribution),
        )
        .route("/api/admin/cache/invalidate", post(invalidate_cache))
}
