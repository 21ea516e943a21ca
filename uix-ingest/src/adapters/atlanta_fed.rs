//! Atlanta Fed Survey of Business Uncertainty
//!
//! The workbook layout drifts between releases, so each sheet is searched for
//! a header row (within the first 50 rows) holding a date/month column and a
//! column whose label matches one of the series keywords.

use async_trait::async_trait;
use std::sync::Arc;
use uix_common::MonthLabel;

use super::workbook::{
    cell_date, cell_label, cell_number, latest_on_or_before, Observation, WorkbookFetcher, WorkbookSheet,
};
use super::{AdapterError, AdapterOutcome, Frequency, SurveyAdapter};

pub const SBU_WORKBOOK_URL: &str = "https://www.atlantafed.org/-/media/Project/Atlanta/FRBA/Documents/datafiles/research/surveys/business-uncertainty/sbu-data.xlsx";
pub const SBU_SOURCE_URL: &str =
    "https://www.atlantafed.org/research-and-data/surveys/business-uncertainty";

const HEADER_SEARCH_ROWS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbuSeries {
    EmploymentGrowth,
    RevenueGrowth,
}

impl SbuSeries {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            SbuSeries::EmploymentGrowth => &["empgrowth", "employment", "emp growth", "employment growth"],
            SbuSeries::RevenueGrowth => &["revgrowth", "revenue", "rev growth", "revenue growth"],
        }
    }
}

struct HeaderMatch {
    row: usize,
    date_col: usize,
    value_col: usize,
}

fn find_header_row(sheet: &WorkbookSheet, keywords: &[&str]) -> Option<HeaderMatch> {
    sheet
        .rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .enumerate()
        .find_map(|(row_idx, row)| {
            let labels: Vec<Option<String>> = row.iter().map(cell_label).collect();
            let date_col = labels.iter().position(|l| {
                l.as_deref()
                    .is_some_and(|t| t.contains("date") || t.contains("month"))
            })?;
            let value_col = labels.iter().position(|l| {
                l.as_deref()
                    .is_some_and(|t| keywords.iter().any(|k| t.contains(k)))
            })?;
            Some(HeaderMatch {
                row: row_idx,
                date_col,
                value_col,
            })
        })
}

/// Latest value of `series` dated on or before `month` end
///
/// Sheets are tried in workbook order; the first sheet with a matching header
/// and at least one observation up to the cutoff answers.
pub fn find_sbu_value(
    sheets: &[WorkbookSheet],
    series: SbuSeries,
    month: MonthLabel,
) -> Option<(String, Observation)> {
    let cutoff = month.last_day();

    sheets.iter().find_map(|sheet| {
        let header = find_header_row(sheet, series.keywords())?;
        let observations: Vec<Observation> = sheet
            .rows
            .iter()
            .skip(header.row + 1)
            .filter_map(|row| {
                Some(Observation {
                    date: cell_date(row.get(header.date_col)?)?,
                    value: cell_number(row.get(header.value_col)?)?,
                })
            })
            .collect();
        latest_on_or_before(&observations, cutoff).map(|obs| (sheet.name.clone(), obs))
    })
}

pub struct AtlantaFedSbuAdapter {
    name: String,
    series: SbuSeries,
    workbook_url: String,
    workbooks: Arc<WorkbookFetcher>,
}

impl AtlantaFedSbuAdapter {
    pub fn new(name: &str, series: SbuSeries, workbook_url: &str, workbooks: Arc<WorkbookFetcher>) -> Self {
        Self {
            name: name.to_string(),
            series,
            workbook_url: workbook_url.to_string(),
            workbooks,
        }
    }
}

#[async_trait]
impl SurveyAdapter for AtlantaFedSbuAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_url(&self) -> &str {
        SBU_SOURCE_URL
    }

    fn frequency(&self) -> Frequency {
        Frequency::Monthly
    }

    async fn fetch(&self, month: MonthLabel) -> Result<AdapterOutcome, AdapterError> {
        let workbook = self.workbooks.fetch(&self.workbook_url).await?;
        Ok(match find_sbu_value(&workbook, self.series, month) {
            Some((sheet, obs)) => AdapterOutcome::observed(obs.value, Some(obs.date))
                .with_message(format!("Sheet {}", sheet)),
            None => AdapterOutcome::missing(),
        })
    }
}
