//! Approval snapshot and gate types
//!
//! Snapshots are projections rebuilt from the persisted run, its source values
//! and the release schedules on every read. Nothing here is cached.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApprovalStatus, DueState, RunStatus, SourceStatus};

/// Run-then-approve gate consumed by newsletter drafting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    /// No ingest run exists for the month
    NotRun,
    /// A run exists but is failed, empty or not fully approved
    PendingApproval,
    /// Latest run succeeded and every source value is approved
    Approved,
}

/// One source value as shown to a reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRow {
    pub id: Uuid,
    pub source_name: String,
    pub source_url: String,
    pub value: Option<f64>,
    pub previous_value: Option<f64>,
    pub delta: Option<f64>,
    pub status: SourceStatus,
    pub message: Option<String>,
    pub carried_forward: bool,
    pub approval_status: ApprovalStatus,
    pub approval_note: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub next_expected_release_date: Option<NaiveDate>,
    pub due_state: DueState,
    pub due_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSnapshot {
    pub month: String,
    pub ingest_run_id: Uuid,
    pub ingest_status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub message: Option<String>,
    pub all_approved: bool,
    pub pending_count: usize,
    pub source_count: usize,
    pub gate: GateState,
    pub rows: Vec<ApprovalRow>,
}

/// Result of the approval gate check
///
/// Serialises as `{"ok":false,"reason":...}` or `{"ok":true,"snapshot":...}`.
#[derive(Debug, Clone)]
pub enum ApprovalCheck {
    Blocked { reason: String },
    Approved(Box<ApprovalSnapshot>),
}

impl ApprovalCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, ApprovalCheck::Approved(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ApprovalCheck::Blocked { reason } => Some(reason),
            ApprovalCheck::Approved(_) => None,
        }
    }
}

impl Serialize for ApprovalCheck {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            ok: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            reason: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            snapshot: Option<&'a ApprovalSnapshot>,
        }

        let wire = match self {
            ApprovalCheck::Blocked { reason } => Wire {
                ok: false,
                reason: Some(reason),
                snapshot: None,
            },
            ApprovalCheck::Approved(snapshot) => Wire {
                ok: true,
                reason: None,
                snapshot: Some(snapshot),
            },
        };
        wire.serialize(serializer)
    }
}

/// Reviewer action on a single source value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApprovalAction {
    Approve,
    Reject,
    /// Replace the numeric value; approval resets to PENDING
    Edit { value: f64 },
}

impl ApprovalAction {
    /// Parse the wire form (`approve` / `reject` / `edit` + value)
    pub fn from_parts(action: &str, value: Option<f64>) -> Result<Self, String> {
        match action.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ApprovalAction::Approve),
            "reject" => Ok(ApprovalAction::Reject),
            "edit" => match value {
                Some(value) if value.is_finite() => Ok(ApprovalAction::Edit { value }),
                Some(_) => Err("value must be numeric".to_string()),
                None => Err("value is required for edit".to_string()),
            },
            other => Err(format!("Invalid action: {}", other)),
        }
    }
}
