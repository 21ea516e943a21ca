//! Spreadsheet workbook downloads and cell helpers
//!
//! Workbooks are downloaded once per TTL window and kept as plain cell grids
//! so several adapters can read different columns of the same file.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Duration as DateDuration, NaiveDate};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use uix_common::MonthLabel;

use super::{get_checked, AdapterError, TtlCache};

/// One worksheet as rows of cells
#[derive(Debug, Clone)]
pub struct WorkbookSheet {
    pub name: String,
    pub rows: Vec<Vec<Data>>,
}

pub type Workbook = Arc<Vec<WorkbookSheet>>;

/// A dated numeric observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

/// Downloads and parses `.xlsx` files, cached per URL
pub struct WorkbookFetcher {
    http: reqwest::Client,
    cache: TtlCache<Workbook>,
}

impl WorkbookFetcher {
    pub fn new(http: reqwest::Client, ttl: Duration) -> Self {
        Self {
            http,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &TtlCache<Workbook> {
        &self.cache
    }

    pub async fn fetch(&self, url: &str) -> Result<Workbook, AdapterError> {
        if let Some(workbook) = self.cache.get(url).await {
            tracing::debug!(url = %url, "Workbook served from cache");
            return Ok(workbook);
        }

        let bytes = get_checked(&self.http, url)
            .await?
            .bytes()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        // Decompressing and parsing xlsx is CPU-bound
        let sheets = tokio::task::spawn_blocking(move || parse_workbook(bytes.to_vec()))
            .await
            .map_err(|e| AdapterError::Parse(format!("Workbook parse task failed: {}", e)))??;
        let workbook = Arc::new(sheets);
        tracing::debug!(url = %url, sheets = workbook.len(), "Workbook downloaded");
        self.cache.insert(url, Arc::clone(&workbook)).await;
        Ok(workbook)
    }
}

/// Read every worksheet of an `.xlsx` file
pub fn parse_workbook(bytes: Vec<u8>) -> Result<Vec<WorkbookSheet>, AdapterError> {
    let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AdapterError::Parse(format!("Workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|e| AdapterError::Parse(format!("Sheet {}: {}", name, e)))?;
        sheets.push(WorkbookSheet {
            rows: range.rows().map(|row| row.to_vec()).collect(),
            name,
        });
    }
    Ok(sheets)
}

/// Lowercased trimmed text of a string cell
pub fn cell_label(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.trim().to_lowercase()),
        _ => None,
    }
}

/// Numeric value of a cell; text with thousands separators is accepted
pub fn cell_number(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Date value of a cell: Excel date, serial number or date text
pub fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_text(s),
        _ => None,
    }
}

/// Excel 1900 date system serial to calendar date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(DateDuration::days(serial.floor() as i64))
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }
    MonthLabel::parse(trimmed).ok().map(|m| m.first_day())
}

/// Last day of a calendar quarter
pub fn quarter_end(year: i32, quarter: u32) -> Option<NaiveDate> {
    if !(1..=4).contains(&quarter) {
        return None;
    }
    MonthLabel::new(year, quarter * 3).ok().map(|m| m.last_day())
}

/// Quarter number from `3`, `3.0`, `"Q3"` or `"3"`
pub fn cell_quarter(cell: &Data) -> Option<u32> {
    let quarter = match cell {
        Data::String(s) => s
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u32>()
            .ok()?,
        other => {
            let n = cell_number(other)?;
            if n.fract() != 0.0 {
                return None;
            }
            n as u32
        }
    };
    (1..=4).contains(&quarter).then_some(quarter)
}

/// Latest observation dated on or before `cutoff`
pub fn latest_on_or_before(series: &[Observation], cutoff: NaiveDate) -> Option<Observation> {
    series
        .iter()
        .filter(|obs| obs.date <= cutoff)
        .max_by_key(|obs| obs.date)
        .copied()
}

/// Year of a cell holding a plausible four-digit year
pub fn cell_year(cell: &Data) -> Option<i32> {
    let n = cell_number(cell)?;
    let year = n as i32;
    (n.fract() == 0.0 && (1900..=2200).contains(&year)).then_some(year)
}
