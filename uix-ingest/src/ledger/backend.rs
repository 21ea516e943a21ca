//! Ledger backend trait
//!
//! The minimal RPC surface the pipeline needs from the external spreadsheet:
//! rectangular reads, single-range writes, row append and formula copy.
//! Row and column indices are 0-based throughout.

use async_trait::async_trait;
use thiserror::Error;

/// Cell text as returned by the ledger, row-major
pub type SheetValues = Vec<Vec<String>>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Network(String),

    #[error("Ledger API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Ledger authentication failed: {0}")]
    Auth(String),

    #[error("Failed to parse ledger response: {0}")]
    Parse(String),

    #[error("Sheet {0} not found")]
    SheetNotFound(String),

    #[error("Column not found in sheet header: {0}")]
    UnknownHeader(String),

    #[error("Ledger data malformed: {0}")]
    Malformed(String),

    #[error("Ledger not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Network(err.to_string())
    }
}

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Every populated cell of a sheet
    async fn read_sheet(&self, sheet: &str) -> Result<SheetValues, LedgerError>;

    /// Overwrite a block starting at (`start_row`, `start_col`); cells outside it are untouched
    async fn update_range(
        &self,
        sheet: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<(), LedgerError>;

    /// Append one row after the last populated row, returning its index
    async fn append_row(&self, sheet: &str, values: &[String]) -> Result<usize, LedgerError>;

    /// Paste formulas of `source_row` into `target_row` for columns `start_col..=end_col`
    async fn copy_formula_range(
        &self,
        sheet: &str,
        source_row: usize,
        target_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<(), LedgerError>;

    /// Overwrite part of a single row
    async fn update_row_range(
        &self,
        sheet: &str,
        row: usize,
        start_col: usize,
        values: &[String],
    ) -> Result<(), LedgerError> {
        self.update_range(sheet, row, start_col, &[values.to_vec()])
            .await
    }
}
