//! Ingest run record
//!
//! One per invocation for a target month. Created optimistically as SUCCESS,
//! finalised with the aggregated warning text or flipped to FAILED when the
//! orchestration itself errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRun {
    pub id: Uuid,
    /// Month label, e.g. `Feb 2026`
    pub month: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl IngestRun {
    /// New run in its optimistic initial state
    pub fn start(month: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            month,
            status: RunStatus::Success,
            started_at,
            finished_at: None,
            message: None,
        }
    }
}
