//! Prediction endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use rankcast_common::PredictionResult;

use super::ApiError;
use crate::AppState;

/// Body of POST /api/predict
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub year: i32,
    pub score: f64,
    #[serde(default)]
    pub category: Option<String>,
}

/// Body of POST /api/predict/history
#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub score: f64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub score: f64,
    pub results: Vec<PredictionResult>,
}

#[derive(Debug, Serialize)]
pub struct YearsResponse {
    pub years: Vec<i32>,
}

/// POST /api/predict
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(request) = body?;
    let result = state
        .predictor
        .predict(request.year, request.score, request.category.as_deref())
        .await?;
    Ok(Json(result))
}

/// POST /api/predict/history
///
/// Rank of one score against every stored year.
pub async fn history(
    State(state): State<AppState>,
    body: Result<Json<HistoryRequest>, JsonRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Json(request) = body?;
    let results = state
        .predictor
        .history(request.score, request.category.as_deref())
        .await?;
    Ok(Json(HistoryResponse {
        score: request.score,
        results,
    }))
}

/// GET /api/years
pub async fn list_years(State(state): State<AppState>) -> Result<Json<YearsResponse>, ApiError> {
    let years = state.predictor.years().await?;
    Ok(Json(YearsResponse { years }))
}

pub fn predict_routes() -> Router<AppState> {
    Router::new()
        .route("/api/predict", post(predict))
        .route("/api/predict/history", post(history))
        .route("/api/years", get(list_years))
}
