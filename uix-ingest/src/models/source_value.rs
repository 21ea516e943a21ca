//! Source value record: one source's resolved observation for one run

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-source outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "warning")]
    Warning,
    /// The ledger has no column for this source
    #[serde(rename = "MISSING_HEADER")]
    MissingHeader,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Success => "success",
            SourceStatus::Missing => "missing",
            SourceStatus::Failed => "failed",
            SourceStatus::Warning => "warning",
            SourceStatus::MissingHeader => "MISSING_HEADER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(SourceStatus::Success),
            "missing" => Some(SourceStatus::Missing),
            "failed" => Some(SourceStatus::Failed),
            "warning" => Some(SourceStatus::Warning),
            "MISSING_HEADER" => Some(SourceStatus::MissingHeader),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(ApprovalStatus::Pending),
            "APPROVED" => Some(ApprovalStatus::Approved),
            "REJECTED" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// Persisted source value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceValue {
    pub id: Uuid,
    pub ingest_id: Uuid,
    pub source_name: String,
    pub source_url: String,
    pub value: Option<f64>,
    pub previous_value: Option<f64>,
    pub delta: Option<f64>,
    pub status: SourceStatus,
    pub carried_forward: bool,
    pub value_date: Option<NaiveDate>,
    pub message: Option<String>,
    pub approval_status: ApprovalStatus,
    pub approval_note: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Fields written when a run persists a source; approval starts PENDING
#[derive(Debug, Clone, PartialEq)]
pub struct NewSourceValue {
    pub source_name: String,
    pub source_url: String,
    pub value: Option<f64>,
    pub previous_value: Option<f64>,
    pub delta: Option<f64>,
    pub status: SourceStatus,
    pub carried_forward: bool,
    pub value_date: Option<NaiveDate>,
    pub message: Option<String>,
}

/// `current - previous` when both sides are present and finite
pub fn compute_delta(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(current), Some(previous)) if current.is_finite() && previous.is_finite() => {
            Some(current - previous)
        }
        _ => None,
    }
}
