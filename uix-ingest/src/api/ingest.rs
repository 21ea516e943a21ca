//! Ingest trigger endpoints

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_month;
use crate::services::{BackfillReport, IngestSummary, ManualUpdate, RunHistory};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_BACKFILL_MONTHS: i64 = 4;
const DEFAULT_HISTORY_LIMIT: u32 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct MonthlyRequest {
    pub month: Option<String>,
}

/// POST /ingest/monthly
///
/// **Request:** `{"month": "Feb 2026"}` (optional, defaults to the current month)
/// **Response:** `{"status": "ok", "result": {"ingestRunId", "month", "warnings"}}`
pub async fn run_monthly(
    State(state): State<AppState>,
    body: Option<Json<MonthlyRequest>>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let month = parse_month(request.month.as_deref())?;

    let result: IngestSummary = state.orchestrator.run_monthly_ingest(month).await?;
    Ok(Json(json!({ "status": "ok", "result": result })))
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    pub months: Option<i64>,
}

/// POST /ingest/backfill
///
/// Runs the current month and the preceding months one at a time.
pub async fn run_backfill(
    State(state): State<AppState>,
    body: Option<Json<BackfillRequest>>,
) -> ApiResult<Json<BackfillReport>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let months = request.months.unwrap_or(DEFAULT_BACKFILL_MONTHS);
    let months = u32::try_from(months)
        .ok()
        .filter(|m| (1..=24).contains(m))
        .ok_or_else(|| ApiError::BadRequest("Invalid months".to_string()))?;

    Ok(Json(state.orchestrator.run_backfill(months).await?))
}

#[derive(Debug, Deserialize)]
pub struct ManualRequest {
    pub month: String,
    pub values: HashMap<String, f64>,
}

/// POST /ingest/manual
pub async fn apply_manual(
    State(state): State<AppState>,
    Json(request): Json<ManualRequest>,
) -> ApiResult<Json<Value>> {
    let month = parse_month(Some(&request.month))?
        .ok_or_else(|| ApiError::BadRequest("month is required".to_string()))?;

    let result: ManualUpdate = state.orchestrator.apply_manual_values(month, &request.values).await?;
    Ok(Json(json!({ "status": "ok", "result": result })))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// GET /ingest/history
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 50);
    let runs: Vec<RunHistory> = state.orchestrator.recent_runs(limit).await?;
    Ok(Json(json!({ "ingestRuns": runs })))
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest/monthly", post(run_monthly))
        .route("/ingest/backfill", post(run_backfill))
        .route("/ingest/manual", post(apply_manual))
        .route("/ingest/history", get(history))
}
