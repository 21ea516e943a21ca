//! HTTP API handlers for uix-ingest
//!
//! Thin trigger layer: each handler parses its input, calls one service
//! operation and maps the result to JSON.

pub mod approvals;
pub mod health;
pub mod ingest;
pub mod schedules;
pub mod settings;
pub mod statistics;

pub use approvals::approval_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use schedules::schedule_routes;
pub use settings::settings_routes;
pub use statistics::statistics_routes;

use uix_common::MonthLabel;

use crate::ApiError;

/// Parse an optional month parameter, blank meaning "not given"
pub(crate) fn parse_month(raw: Option<&str>) -> Result<Option<MonthLabel>, ApiError> {
    match raw.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(None),
        Some(m) => MonthLabel::parse(m)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid month: {}", m))),
    }
}
