//! Source release schedule

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Whether a source's next release is behind or ahead of today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DueState {
    PastDue,
    Upcoming,
    Unknown,
}

impl DueState {
    /// Due state plus the human label shown next to it
    pub fn describe(next_release: Option<NaiveDate>, today: NaiveDate) -> (DueState, String) {
        match next_release {
            None => (DueState::Unknown, "No release date configured".to_string()),
            Some(date) if date <= today => (
                DueState::PastDue,
                format!("Past due · {}", date.format("%B %-d, %Y")),
            ),
            Some(date) => (
                DueState::Upcoming,
                format!("Upcoming · {}", date.format("%B %-d, %Y")),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReleaseSchedule {
    pub source_name: String,
    /// Cadence in months (1 monthly, 3 quarterly)
    pub advance_months: u32,
    pub next_expected_release_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}
