//! Database access layer for uix-ingest
//!
//! Runtime queries against the tables created by `uix_common::db::init_schema`.
//! Timestamps are stored as RFC 3339 text with microseconds, dates as
//! `YYYY-MM-DD`.

pub mod runs;
pub mod schedules;
pub mod settings;
pub mod source_values;
pub mod statistics;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uix_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::corrupt(column, e))
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(&s, column)).transpose()
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(raw: &str, column: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| Error::corrupt(column, e))
}

pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::corrupt(column, e))
}
