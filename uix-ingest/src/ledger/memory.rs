//! In-process ledger
//!
//! Holds sheets as cell text (formulas kept as `=...` strings) and mimics the
//! remote behaviour the pipeline relies on: trailing blanks are omitted on
//! read, appends land after the last populated row and formula pastes shift
//! relative row references. Individual operations can be made to fail.

use async_trait::async_trait;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tokio::sync::Mutex;

use super::backend::{LedgerBackend, LedgerError, SheetValues};

/// Backend operation, used for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Read,
    Update,
    Append,
    CopyFormula,
}

#[derive(Default)]
pub struct InMemoryLedger {
    sheets: Mutex<HashMap<String, SheetValues>>,
    failures: Mutex<HashSet<(LedgerOp, Option<String>)>>,
    calls: Mutex<Vec<(LedgerOp, String)>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InMemoryLedger::set_sheet`]
    pub fn with_sheet<S: AsRef<str>>(mut self, name: &str, rows: Vec<Vec<S>>) -> Self {
        self.sheets.get_mut().insert(name.to_string(), to_values(rows));
        self
    }

    pub async fn set_sheet<S: AsRef<str>>(&self, name: &str, rows: Vec<Vec<S>>) {
        self.sheets.lock().await.insert(name.to_string(), to_values(rows));
    }

    /// Raw cell text of a sheet, including formulas
    pub async fn sheet(&self, name: &str) -> Option<SheetValues> {
        self.sheets.lock().await.get(name).map(|rows| trimmed(rows))
    }

    /// Make `op` fail on every sheet
    pub async fn fail_on(&self, op: LedgerOp) {
        self.failures.lock().await.insert((op, None));
    }

    /// Make `op` fail on one sheet only
    pub async fn fail_on_sheet(&self, op: LedgerOp, sheet: &str) {
        self.failures.lock().await.insert((op, Some(sheet.to_string())));
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    /// Number of `op` calls made against `sheet`
    pub async fn call_count(&self, op: LedgerOp, sheet: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(o, s)| *o == op && s == sheet)
            .count()
    }

    async fn enter(&self, op: LedgerOp, sheet: &str) -> Result<(), LedgerError> {
        self.calls.lock().await.push((op, sheet.to_string()));

        let failures = self.failures.lock().await;
        if failures.contains(&(op, None)) || failures.contains(&(op, Some(sheet.to_string()))) {
            return Err(LedgerError::Api {
                status: 503,
                body: format!("injected {:?} failure on {}", op, sheet),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for InMemoryLedger {
    async fn read_sheet(&self, sheet: &str) -> Result<SheetValues, LedgerError> {
        self.enter(LedgerOp::Read, sheet).await?;
        self.sheets
            .lock()
            .await
            .get(sheet)
            .map(|rows| trimmed(rows))
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))
    }

    async fn update_range(
        &self,
        sheet: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<(), LedgerError> {
        self.enter(LedgerOp::Update, sheet).await?;
        let mut sheets = self.sheets.lock().await;
        let grid = sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        for (offset, values) in rows.iter().enumerate() {
            write_cells(grid, start_row + offset, start_col, values);
        }
        Ok(())
    }

    async fn append_row(&self, sheet: &str, values: &[String]) -> Result<usize, LedgerError> {
        self.enter(LedgerOp::Append, sheet).await?;
        let mut sheets = self.sheets.lock().await;
        let grid = sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        let row_index = grid
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map_or(0, |last| last + 1);
        write_cells(grid, row_index, 0, values);
        Ok(row_index)
    }

    async fn copy_formula_range(
        &self,
        sheet: &str,
        source_row: usize,
        target_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<(), LedgerError> {
        self.enter(LedgerOp::CopyFormula, sheet).await?;
        let mut sheets = self.sheets.lock().await;
        let grid = sheets
            .get_mut(sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

        let shift = target_row as i64 - source_row as i64;
        let pasted: Vec<String> = (start_col..=end_col)
            .map(|col| {
                let source = grid
                    .get(source_row)
                    .and_then(|row| row.get(col))
                    .map(String::as_str)
                    .unwrap_or("");
                shift_formula_rows(source, shift)
            })
            .collect();
        write_cells(grid, target_row, start_col, &pasted);
        Ok(())
    }
}

fn to_values<S: AsRef<str>>(rows: Vec<Vec<S>>) -> SheetValues {
    rows.into_iter()
        .map(|row| row.iter().map(|c| c.as_ref().to_string()).collect())
        .collect()
}

fn write_cells(grid: &mut SheetValues, row: usize, start_col: usize, values: &[String]) {
    if grid.len() <= row {
        grid.resize_with(row + 1, Vec::new);
    }
    let target = &mut grid[row];
    if target.len() < start_col + values.len() {
        target.resize(start_col + values.len(), String::new());
    }
    for (offset, value) in values.iter().enumerate() {
        target[start_col + offset] = value.clone();
    }
}

fn trimmed(rows: &SheetValues) -> SheetValues {
    let mut out: SheetValues = rows
        .iter()
        .map(|row| {
            let len = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            row[..len].to_vec()
        })
        .collect();
    while out.last().is_some_and(|row| row.is_empty()) {
        out.pop();
    }
    out
}

fn cell_reference() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b(\$?[A-Z]{1,3})(\$?)(\d+)\b(\()?").ok())
        .as_ref()
}

/// Shift relative row numbers of every cell reference in a formula
fn shift_formula_rows(cell: &str, shift: i64) -> String {
    let Some(pattern) = cell_reference() else {
        return cell.to_string();
    };
    if !cell.starts_with('=') || shift == 0 {
        return cell.to_string();
    }

    pattern
        .replace_all(cell, |caps: &Captures| {
            let whole = &caps[0];
            // A trailing `(` means a function name such as LOG10
            if caps.get(4).is_some() || &caps[2] == "$" {
                return whole.to_string();
            }
            match caps[3].parse::<i64>() {
                Ok(row) if row + shift >= 1 => format!("{}{}", &caps[1], row + shift),
                _ => whole.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_formula_rows() {
        assert_eq!(shift_formula_rows("=(B3-Meta!C2)/Meta!D2", 1), "=(B4-Meta!C3)/Meta!D3");
        assert_eq!(shift_formula_rows("=B$3+$C4", 2), "=B$3+$C6");
        assert_eq!(shift_formula_rows("=LOG10(B3)", 1), "=LOG10(B4)");
        assert_eq!(shift_formula_rows("42", 5), "42");
    }

    #[tokio::test]
    async fn test_append_after_last_populated_row() {
        let ledger = InMemoryLedger::new().with_sheet(
            "Data",
            vec![vec!["DATE", "A"], vec!["Jan 2026", "1"], vec!["", ""]],
        );

        let index = ledger
            .append_row("Data", &["Feb 2026".to_string(), "2".to_string()])
            .await
            .unwrap();
        assert_eq!(index, 2);

        let rows = ledger.read_sheet("Data").await.unwrap();
        assert_eq!(rows[2], vec!["Feb 2026", "2"]);
    }

    #[tokio::test]
    async fn test_read_omits_trailing_blanks() {
        let ledger = InMemoryLedger::new().with_sheet("S", vec![vec!["a", "", ""], vec!["", ""]]);
        assert_eq!(ledger.read_sheet("S").await.unwrap(), vec![vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_per_sheet() {
        let ledger = InMemoryLedger::new()
            .with_sheet("Data", vec![vec!["DATE"]])
            .with_sheet("zscores", vec![vec!["DATE"]]);
        ledger.fail_on_sheet(LedgerOp::Read, "zscores").await;

        assert!(ledger.read_sheet("Data").await.is_ok());
        assert!(ledger.read_sheet("zscores").await.is_err());
        assert_eq!(ledger.call_count(LedgerOp::Read, "zscores").await, 1);
    }
}
