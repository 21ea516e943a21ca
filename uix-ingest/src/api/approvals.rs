//! Approval endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::parse_month;
use crate::models::{ApprovalAction, ApprovalCheck, GateState};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

fn month_label(state: &AppState, query: &MonthQuery) -> ApiResult<String> {
    Ok(parse_month(query.month.as_deref())?
        .unwrap_or_else(|| state.clock.current_month())
        .to_string())
}

/// GET /approvals/month?month=Feb%202026
///
/// 404 with `snapshot: null` when the month has never been ingested.
pub async fn month_snapshot(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Response> {
    let month = month_label(&state, &query)?;
    let response = match state.approvals.get_snapshot(&month).await? {
        Some(snapshot) => Json(json!({ "month": month, "snapshot": snapshot })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "month": month, "snapshot": null })),
        )
            .into_response(),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActionRequest {
    pub source_value_id: String,
    pub action: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
    /// Reviewer identity recorded as the approver
    #[serde(default)]
    pub actor: String,
}

/// POST /approvals/source
///
/// **Request:** `{"sourceValueId", "action": "approve"|"reject"|"edit", "value"?, "note"?, "actor"}`
pub async fn source_action(
    State(state): State<AppState>,
    Json(request): Json<SourceActionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = Uuid::parse_str(request.source_value_id.trim())
        .map_err(|_| ApiError::BadRequest("sourceValueId and action are required".to_string()))?;
    let action = ApprovalAction::from_parts(&request.action, request.value).map_err(ApiError::BadRequest)?;

    let updated = state
        .approvals
        .mutate(id, action, request.note.as_deref(), &request.actor)
        .await?;
    Ok(Json(json!({ "sourceValue": updated })))
}

#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub month: String,
    pub gate: GateState,
    #[serde(flatten)]
    pub check: ApprovalCheck,
}

/// GET /approvals/gate?month=
pub async fn gate(State(state): State<AppState>, Query(query): Query<MonthQuery>) -> ApiResult<Json<GateResponse>> {
    let month = month_label(&state, &query)?;
    let check = state.approvals.assert_month_approved(&month).await?;
    let gate = match &check {
        ApprovalCheck::Approved(_) => GateState::Approved,
        ApprovalCheck::Blocked { .. } => state.approvals.gate_state(&month).await?,
    };
    Ok(Json(GateResponse { month, gate, check }))
}

pub fn approval_routes() -> Router<AppState> {
    Router::new()
        .route("/approvals/month", get(month_snapshot))
        .route("/approvals/source", post(source_action))
        .route("/approvals/gate", get(gate))
}
