//! Source release schedule endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiError, ApiResult, AppState};

/// GET /source-schedules
///
/// Every panel source, with cadence defaults for sources never configured.
pub async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let schedules = state.orchestrator.schedules().list().await?;
    Ok(Json(json!({ "schedules": schedules })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub source_name: String,
    pub advance_months: Option<f64>,
    pub next_expected_release_date: Option<String>,
}

/// POST /source-schedules
///
/// **Errors:** 400 for a missing or invalid field, 404 for an unknown source
pub async fn upsert_schedule(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Json<Value>> {
    let required = || {
        ApiError::BadRequest("sourceName, advanceMonths, and nextExpectedReleaseDate are required".to_string())
    };

    let advance_months = request
        .advance_months
        .filter(|m| m.is_finite() && *m >= 1.0 && m.fract() == 0.0 && *m <= f64::from(u32::MAX))
        .map(|m| m as u32)
        .ok_or_else(required)?;
    let raw_date = request
        .next_expected_release_date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(required)?;
    let next = parse_release_date(raw_date)
        .ok_or_else(|| ApiError::BadRequest("Invalid nextExpectedReleaseDate".to_string()))?;

    let schedule = state
        .orchestrator
        .schedules()
        .upsert(&request.source_name, advance_months, next)
        .await?;
    Ok(Json(json!({ "schedule": schedule })))
}

/// `YYYY-MM-DD` or an RFC 3339 timestamp (date part kept)
fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

pub fn schedule_routes() -> Router<AppState> {
    Router::new().route("/source-schedules", get(list_schedules).post(upsert_schedule))
}
