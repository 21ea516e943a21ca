//! Settings endpoint
//!
//! Stores the FRED API key in the database, the highest-priority tier of key
//! resolution. Adapters pick the key up at the next start.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /settings/fred_api_key
///
/// **Request:** `{"api_key": "..."}`
/// **Errors:** 400 for an empty or whitespace-only key
pub async fn set_fred_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    crate::db::settings::set_fred_api_key(&state.db, &payload.api_key)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("FRED API key configured via API");

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "FRED API key saved; restart the service to apply it".to_string(),
    }))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/settings/fred_api_key", post(set_fred_api_key))
}
