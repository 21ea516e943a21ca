//! Tabular ledger adapter
//!
//! The ledger is a spreadsheet keyed by a month label in column 0. Columns up
//! to the last adapter-owned ("raw") column are written by the pipeline;
//! everything to the right holds formulas authored outside this system and is
//! never overwritten. New rows get those formulas pasted from the row above.

pub mod a1;
pub mod backend;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod sheets;

pub use backend::{LedgerBackend, LedgerError, SheetValues};
#[cfg(any(test, feature = "test-support"))]
pub use memory::{InMemoryLedger, LedgerOp};
pub use sheets::{GoogleSheetsBackend, SheetsAuth};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uix_common::MonthLabel;

use crate::models::SourceStatistics;

/// Trim and collapse internal whitespace
pub fn normalize_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lookup key for a header: normalized and lowercased, so minor drift in
/// spacing or capitalisation still maps to the same column
pub fn header_key(header: &str) -> String {
    normalize_header(header).to_lowercase()
}

/// Cell text to number; blanks and non-numeric text are `None`
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Cell text for a number (`97` rather than `97.0`), blank for `None`
pub fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One sheet read from the ledger
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    values: SheetValues,
}

impl Sheet {
    pub fn new(values: SheetValues) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &SheetValues {
        &self.values
    }

    /// Header row (row 0)
    pub fn headers(&self) -> &[String] {
        self.values.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Header key → column index
    pub fn header_map(&self) -> HashMap<String, usize> {
        self.headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.trim().is_empty())
            .map(|(idx, h)| (header_key(h), idx))
            .collect()
    }

    /// Data row whose column 0 equals `date_label` exactly
    pub fn find_row_by_date(&self, date_label: &str) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| row.first().map(String::as_str) == Some(date_label))
            .map(|(idx, _)| idx)
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.values.get(index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.values.get(row)?.get(col).map(String::as_str)
    }

    /// Data row with the latest month label strictly before `month`
    pub fn previous_row_index(&self, month: MonthLabel) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, row)| {
                let label = MonthLabel::parse(row.first()?).ok()?;
                (label < month).then_some((label, idx))
            })
            .max_by_key(|(label, idx)| (*label, *idx))
            .map(|(_, idx)| idx)
    }

    /// Header key → numeric cell of the row preceding `month`
    pub fn previous_values(&self, month: MonthLabel) -> HashMap<String, Option<f64>> {
        let Some(row_idx) = self.previous_row_index(month) else {
            return HashMap::new();
        };
        self.header_map()
            .into_iter()
            .map(|(header, col)| {
                let value = self.cell(row_idx, col).and_then(parse_numeric);
                (header, value)
            })
            .collect()
    }

    /// Number of rows including the header
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a partial row upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Appended { row: usize },
    Updated { row: usize },
}

/// High-level ledger operations over a backend
#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn LedgerBackend>,
    data_sheet: String,
    zscore_sheet: String,
    meta_sheet: String,
}

impl Ledger {
    pub fn new(
        backend: Arc<dyn LedgerBackend>,
        data_sheet: impl Into<String>,
        zscore_sheet: impl Into<String>,
        meta_sheet: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            data_sheet: data_sheet.into(),
            zscore_sheet: zscore_sheet.into(),
            meta_sheet: meta_sheet.into(),
        }
    }

    pub fn data_sheet(&self) -> &str {
        &self.data_sheet
    }

    pub fn zscore_sheet(&self) -> &str {
        &self.zscore_sheet
    }

    pub async fn read_sheet(&self, name: &str) -> Result<Sheet, LedgerError> {
        Ok(Sheet::new(self.backend.read_sheet(name).await?))
    }

    /// Write the raw columns of one month row, leaving formula columns alone
    ///
    /// `data` is keyed by [`header_key`]. Only columns `0..=max_raw_index`
    /// are written; columns without an entry are written blank. When the row
    /// is new, formulas for the trailing columns are pasted from the row above;
    /// a failed paste is logged and does not fail the upsert.
    pub async fn partial_upsert_row(
        &self,
        sheet_name: &str,
        date_label: &str,
        data: &HashMap<String, Option<f64>>,
        max_raw_index: usize,
    ) -> Result<UpsertAction, LedgerError> {
        let sheet = self.read_sheet(sheet_name).await?;
        let headers = sheet.headers();
        if headers.is_empty() {
            return Err(LedgerError::Malformed(format!("Sheet {} has no header row", sheet_name)));
        }

        let row: Vec<String> = (0..=max_raw_index)
            .map(|idx| {
                if idx == 0 {
                    return date_label.to_string();
                }
                headers
                    .get(idx)
                    .and_then(|h| data.get(&header_key(h)))
                    .map(|v| format_cell(*v))
                    .unwrap_or_default()
            })
            .collect();

        let action = match sheet.find_row_by_date(date_label) {
            Some(row_idx) => {
                self.backend
                    .update_row_range(sheet_name, row_idx, 0, &row)
                    .await?;
                UpsertAction::Updated { row: row_idx }
            }
            None => {
                let row_idx = self.backend.append_row(sheet_name, &row).await?;
                self.propagate_formulas(sheet_name, row_idx, max_raw_index + 1, headers.len())
                    .await;
                UpsertAction::Appended { row: row_idx }
            }
        };

        tracing::info!(sheet = %sheet_name, date = %date_label, action = ?action, "Ledger row upserted");
        Ok(action)
    }

    /// Update individual raw cells of a month row, creating the row if needed
    ///
    /// Every header must exist and sit within the raw columns.
    pub async fn patch_row(
        &self,
        sheet_name: &str,
        date_label: &str,
        values: &HashMap<String, f64>,
        max_raw_index: usize,
    ) -> Result<UpsertAction, LedgerError> {
        let sheet = self.read_sheet(sheet_name).await?;
        let header_map = sheet.header_map();

        let mut cells: BTreeMap<usize, String> = BTreeMap::new();
        for (header, value) in values {
            let col = header_map
                .get(&header_key(header))
                .copied()
                .filter(|col| *col > 0 && *col <= max_raw_index)
                .ok_or_else(|| LedgerError::UnknownHeader(header.clone()))?;
            cells.insert(col, format_cell(Some(*value)));
        }

        match sheet.find_row_by_date(date_label) {
            Some(row_idx) => {
                for (col, text) in &cells {
                    self.backend
                        .update_row_range(sheet_name, row_idx, *col, std::slice::from_ref(text))
                        .await?;
                }
                Ok(UpsertAction::Updated { row: row_idx })
            }
            None => {
                let mut row = vec![String::new(); max_raw_index + 1];
                row[0] = date_label.to_string();
                for (col, text) in cells {
                    row[col] = text;
                }
                let row_idx = self.backend.append_row(sheet_name, &row).await?;
                self.propagate_formulas(sheet_name, row_idx, max_raw_index + 1, sheet.headers().len())
                    .await;
                Ok(UpsertAction::Appended { row: row_idx })
            }
        }
    }

    /// Paste formulas from the row above into `start_col..width`; failures are swallowed
    async fn propagate_formulas(&self, sheet_name: &str, row_idx: usize, start_col: usize, width: usize) {
        if start_col >= width || row_idx < 2 {
            return;
        }
        if let Err(e) = self
            .backend
            .copy_formula_range(sheet_name, row_idx - 1, row_idx, start_col, width - 1)
            .await
        {
            tracing::warn!(sheet = %sheet_name, row = row_idx, error = %e, "Formula copy failed");
        }
    }

    /// Append every data-sheet date missing from the z-score sheet
    ///
    /// Each new mirror row gets the z-score formulas of the row above it.
    /// Returns the labels added.
    pub async fn mirror_dates_into_zscores(&self) -> Result<Vec<String>, LedgerError> {
        let data = self.read_sheet(&self.data_sheet).await?;
        let zscores = self.read_sheet(&self.zscore_sheet).await?;
        let width = zscores.headers().len();

        let mut added = Vec::new();
        for row in data.values().iter().skip(1) {
            let Some(label) = row.first().filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            if zscores.find_row_by_date(label).is_some() || added.contains(label) {
                continue;
            }

            let row_idx = self
                .backend
                .append_row(&self.zscore_sheet, std::slice::from_ref(label))
                .await?;
            self.propagate_formulas(&self.zscore_sheet, row_idx, 1, width).await;
            added.push(label.clone());
        }

        if !added.is_empty() {
            tracing::info!(sheet = %self.zscore_sheet, added = ?added, "Mirrored dates into z-score sheet");
        }
        Ok(added)
    }

    /// Reorder data rows chronologically by rewriting columns `0..=max_raw_index`
    ///
    /// Formula columns stay in place since they reference their own row.
    /// Labels that do not parse as months sort after all parsed ones in their
    /// existing order. Returns whether anything was rewritten.
    pub async fn sort_by_date_column(&self, sheet_name: &str, max_raw_index: usize) -> Result<bool, LedgerError> {
        let sheet = self.read_sheet(sheet_name).await?;
        let width = max_raw_index + 1;

        let rows: Vec<Vec<String>> = sheet
            .values()
            .iter()
            .skip(1)
            .map(|row| {
                let mut raw: Vec<String> = row.iter().take(width).cloned().collect();
                raw.resize(width, String::new());
                raw
            })
            .collect();

        let mut sorted = rows.clone();
        sorted.sort_by_key(|row| match MonthLabel::parse(&row[0]) {
            Ok(label) => (0, Some(label)),
            Err(_) => (1, None),
        });

        if sorted == rows {
            return Ok(false);
        }

        self.backend.update_range(sheet_name, 1, 0, &sorted).await?;
        tracing::info!(sheet = %sheet_name, rows = sorted.len(), "Sorted sheet by date");
        Ok(true)
    }

    /// Per-survey weight/mean/stdev/direction from the meta sheet
    pub async fn read_meta_statistics(&self) -> Result<Vec<SourceStatistics>, LedgerError> {
        let sheet = self.read_sheet(&self.meta_sheet).await?;
        let headers = sheet.header_map();
        let survey_idx = headers.get("survey").copied().unwrap_or(0);
        let numeric = |row: &[String], key: &str| {
            headers
                .get(key)
                .and_then(|idx| row.get(*idx))
                .and_then(|raw| parse_numeric(raw))
        };

        Ok(sheet
            .values()
            .iter()
            .skip(1)
            .filter_map(|row| {
                let survey = row.get(survey_idx)?.trim();
                if survey.is_empty() {
                    return None;
                }
                Some(SourceStatistics {
                    survey: survey.to_string(),
                    weight: numeric(row, "weight"),
                    mean: numeric(row, "mean"),
                    stdev: numeric(row, "stdev"),
                    direction: headers
                        .get("direction")
                        .and_then(|idx| row.get(*idx))
                        .filter(|d| !d.trim().is_empty())
                        .cloned(),
                })
            })
            .collect())
    }

    /// Z-score row per requested month label (`header → value`)
    pub async fn zscores_for_months(
        &self,
        labels: &[String],
    ) -> Result<HashMap<String, BTreeMap<String, Option<f64>>>, LedgerError> {
        let sheet = self.read_sheet(&self.zscore_sheet).await?;
        let headers: Vec<String> = sheet.headers().iter().map(|h| normalize_header(h)).collect();
        let date_idx = headers.iter().position(|h| h == "DATE").unwrap_or(0);

        let mut result = HashMap::new();
        for row in sheet.values().iter().skip(1) {
            let Some(date) = row.get(date_idx).filter(|d| labels.contains(d)) else {
                continue;
            };
            let record: BTreeMap<String, Option<f64>> = headers
                .iter()
                .enumerate()
                .filter(|(idx, h)| *idx != date_idx && !h.is_empty())
                .map(|(idx, h)| (h.clone(), row.get(idx).and_then(|raw| parse_numeric(raw))))
                .collect();
            result.insert(date.clone(), record);
        }
        Ok(result)
    }
}
