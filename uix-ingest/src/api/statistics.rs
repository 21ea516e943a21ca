//! Survey statistics endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::db::statistics;
use crate::{ApiResult, AppState};

/// GET /statistics
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = statistics::list_statistics(&state.db).await?;
    Ok(Json(json!({ "statistics": stats })))
}

/// POST /statistics/refresh
///
/// Reloads weight/mean/stdev from the ledger's meta sheet.
pub async fn refresh(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let count = state.orchestrator.refresh_statistics().await?;
    Ok(Json(json!({ "status": "ok", "count": count })))
}

pub fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/statistics", get(list))
        .route("/statistics/refresh", post(refresh))
}
