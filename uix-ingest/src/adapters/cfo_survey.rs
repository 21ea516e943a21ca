//! Duke/Richmond Fed CFO Survey optimism
//!
//! The workbook splits history across two sheets with different column names.
//! Both are merged into one quarterly series dated at quarter end; where the
//! sheets overlap, the later sheet wins.

use async_trait::async_trait;
use calamine::Data;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use uix_common::MonthLabel;

use super::workbook::{cell_label, cell_number, cell_quarter, cell_year, quarter_end, WorkbookFetcher, WorkbookSheet};
use super::{AdapterError, AdapterOutcome, Frequency, SurveyAdapter};

pub const CFO_WORKBOOK_URL: &str = "https://www.richmondfed.org/-/media/RichmondFedOrg/research/national_economy/cfo_survey/current_historical_cfo_data.xlsx";
pub const CFO_SOURCE_URL: &str =
    "https://www.richmondfed.org/research/national_economy/cfo_survey/data_and_results";

struct CfoSheetLayout {
    sheet: &'static str,
    year: &'static str,
    quarter: &'static str,
    economy: &'static str,
    own_firm: &'static str,
}

const CFO_SHEETS: [CfoSheetLayout; 2] = [
    CfoSheetLayout {
        sheet: "through_Q1_2020",
        year: "year",
        quarter: "quarter",
        economy: "opt_rating_econ",
        own_firm: "opt_rating_own",
    },
    CfoSheetLayout {
        sheet: "CFO_optimism_all",
        year: "year",
        quarter: "quarter",
        economy: "economy_mean",
        own_firm: "ownfirm_mean",
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfoPoint {
    pub date: NaiveDate,
    pub economy: f64,
    pub own_firm: f64,
}

/// Which optimism rating an adapter reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfoMeasure {
    Economy,
    OwnFirm,
}

/// Merged quarterly series from the known sheets, oldest first
pub fn parse_cfo_series(sheets: &[WorkbookSheet]) -> Vec<CfoPoint> {
    let mut by_date: BTreeMap<NaiveDate, CfoPoint> = BTreeMap::new();

    for layout in &CFO_SHEETS {
        let Some(sheet) = sheets.iter().find(|s| s.name == layout.sheet) else {
            continue;
        };
        let Some(header_idx) = sheet
            .rows
            .iter()
            .position(|row| row.iter().any(|c| cell_label(c).as_deref() == Some(layout.year)))
        else {
            continue;
        };

        let header = &sheet.rows[header_idx];
        let column = |name: &str| header.iter().position(|c| cell_label(c).as_deref() == Some(name));
        let (Some(year_col), Some(quarter_col), Some(economy_col), Some(own_col)) = (
            column(layout.year),
            column(layout.quarter),
            column(layout.economy),
            column(layout.own_firm),
        ) else {
            tracing::debug!(sheet = layout.sheet, "CFO sheet missing expected columns");
            continue;
        };

        let columns = [year_col, quarter_col, economy_col, own_col];
        for row in sheet.rows.iter().skip(header_idx + 1) {
            if let Some(point) = parse_cfo_row(row, columns) {
                by_date.insert(point.date, point);
            }
        }
    }

    by_date.into_values().collect()
}

/// `columns` = year, quarter, economy, own firm
fn parse_cfo_row(row: &[Data], columns: [usize; 4]) -> Option<CfoPoint> {
    let [year_col, quarter_col, economy_col, own_col] = columns;
    let year = cell_year(row.get(year_col)?)?;
    let quarter = cell_quarter(row.get(quarter_col)?)?;
    Some(CfoPoint {
        date: quarter_end(year, quarter)?,
        economy: cell_number(row.get(economy_col)?)?,
        own_firm: cell_number(row.get(own_col)?)?,
    })
}

pub struct CfoSurveyAdapter {
    name: String,
    measure: CfoMeasure,
    workbook_url: String,
    workbooks: Arc<WorkbookFetcher>,
}

impl CfoSurveyAdapter {
    pub fn new(name: &str, measure: CfoMeasure, workbook_url: &str, workbooks: Arc<WorkbookFetcher>) -> Self {
        Self {
            name: name.to_string(),
            measure,
            workbook_url: workbook_url.to_string(),
            workbooks,
        }
    }
}

#[async_trait]
impl SurveyAdapter for CfoSurveyAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_url(&self) -> &str {
        CFO_SOURCE_URL
    }

    fn frequency(&self) -> Frequency {
        Frequency::Quarterly
    }

    async fn fetch(&self, month: MonthLabel) -> Result<AdapterOutcome, AdapterError> {
        let workbook = self.workbooks.fetch(&self.workbook_url).await?;
        let series = parse_cfo_series(&workbook);
        if series.is_empty() {
            return Err(AdapterError::Parse("No CFO survey rows found in workbook".to_string()));
        }

        let cutoff = month.last_day();
        Ok(match series.iter().rev().find(|p| p.date <= cutoff) {
            Some(point) => {
                let value = match self.measure {
                    CfoMeasure::Economy => point.economy,
                    CfoMeasure::OwnFirm => point.own_firm,
                };
                AdapterOutcome::observed(value, Some(point.date))
            }
            None => AdapterOutcome::missing(),
        })
    }
}
