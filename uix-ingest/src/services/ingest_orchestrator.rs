//! Monthly ingest orchestrator
//!
//! State progression for one run:
//! STARTED → per source (FETCHING → RESOLVING → VALIDATING → PERSISTED) → FINALIZING → SUCCESS | FAILED
//!
//! Sources are processed concurrently and each persists its own source value.
//! The driver loop is the only writer of the accumulated ledger row, which is
//! upserted once per run after every source has reported. A single source
//! failing never fails the run; only ledger or database errors do.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use uix_common::{Clock, MonthLabel};
use uuid::Uuid;

use super::release_schedule::ReleaseScheduleTracker;
use super::resolution::{self, Resolution};
use super::validator;
use crate::adapters::SurveyAdapter;
use crate::db::{runs, source_values, statistics};
use crate::error::{IngestError, IngestResult};
use crate::ledger::{header_key, Ledger, Sheet, UpsertAction};
use crate::models::{IngestRun, NewSourceValue, RunStatus, SourceStatistics, SourceStatus, SourceValue};

/// Default number of sources fetched at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Backfill window accepted by [`IngestOrchestrator::run_backfill`]
pub const MAX_BACKFILL_MONTHS: u32 = 24;

pub const MISSING_HEADER_MESSAGE: &str = "Sheet header not found";

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub ingest_run_id: Uuid,
    pub month: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillMonth {
    pub month: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillStatus {
    Ok,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub status: BackfillStatus,
    pub results: Vec<BackfillMonth>,
}

/// Outcome of a manual patch of ledger cells
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualUpdate {
    pub month: String,
    pub updated_headers: Vec<String>,
    pub appended: bool,
}

/// A past run with its source values and the month's z-scores
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistory {
    #[serde(flatten)]
    pub run: IngestRun,
    pub sources: Vec<SourceValue>,
    pub zscores: BTreeMap<String, Option<f64>>,
}

/// Everything a source needs that is read once per run
struct RunContext {
    run_id: Uuid,
    month: MonthLabel,
    historical: bool,
    header_map: HashMap<String, usize>,
    existing_row: Option<Vec<String>>,
    previous: HashMap<String, Option<f64>>,
    statistics: HashMap<String, SourceStatistics>,
    default_value_date: NaiveDate,
}

/// What a source contributes back to the driver
struct SourceReport {
    key: String,
    /// `None` when the ledger has no column for the source
    cell: Option<Option<f64>>,
    warning: Option<String>,
}

pub struct IngestOrchestrator {
    db: SqlitePool,
    ledger: Ledger,
    adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>,
    schedules: ReleaseScheduleTracker,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl IngestOrchestrator {
    pub fn new(
        db: SqlitePool,
        ledger: Ledger,
        adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schedules = ReleaseScheduleTracker::new(db.clone(), Arc::clone(&adapters), Arc::clone(&clock));
        Self {
            db,
            ledger,
            adapters,
            schedules,
            clock,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn schedules(&self) -> &ReleaseScheduleTracker {
        &self.schedules
    }

    /// Ingest every source for `target` (default: the current month)
    ///
    /// Returns an error only for orchestration-level failures, after the run
    /// has been marked FAILED with the error text.
    pub async fn run_monthly_ingest(&self, target: Option<MonthLabel>) -> IngestResult<IngestSummary> {
        let month = target.unwrap_or_else(|| self.clock.current_month());
        let run = IngestRun::start(month.to_string(), self.clock.now());
        runs::insert_run(&self.db, &run).await?;

        tracing::info!(run_id = %run.id, month = %month, "Starting monthly ingest");

        if let Err(e) = self.refresh_statistics().await {
            tracing::warn!(error = %e, "Statistics refresh failed, using stored statistics");
        }

        match self.execute(&run, month).await {
            Ok(warnings) => {
                let message = if warnings.is_empty() {
                    format!(
                        "Ingest completed {}",
                        self.clock.now().format("%b %-d, %Y, %-I:%M:%S %p")
                    )
                } else {
                    format!(
                        "Ingest completed with {} validation warnings: {}",
                        warnings.len(),
                        warnings.join("; ")
                    )
                };
                runs::finalize_run(&self.db, run.id, RunStatus::Success, self.clock.now(), Some(&message))
                    .await?;

                tracing::info!(
                    run_id = %run.id,
                    month = %month,
                    warnings = warnings.len(),
                    "Monthly ingest completed"
                );
                Ok(IngestSummary {
                    ingest_run_id: run.id,
                    month: run.month,
                    warnings,
                })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(run_id = %run.id, month = %month, error = %message, "Monthly ingest failed");
                if let Err(finalize_err) =
                    runs::finalize_run(&self.db, run.id, RunStatus::Failed, self.clock.now(), Some(&message))
                        .await
                {
                    tracing::error!(run_id = %run.id, error = %finalize_err, "Failed to mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &IngestRun, month: MonthLabel) -> IngestResult<Vec<String>> {
        let data_sheet = self.ledger.read_sheet(self.ledger.data_sheet()).await?;
        let max_raw_index = raw_column_bound(&data_sheet, &self.adapters);
        let label = month.to_string();
        let current = self.clock.current_month();

        let ctx = RunContext {
            run_id: run.id,
            month,
            historical: month != current,
            header_map: data_sheet.header_map(),
            existing_row: data_sheet
                .find_row_by_date(&label)
                .and_then(|idx| data_sheet.row(idx))
                .map(<[String]>::to_vec),
            previous: data_sheet.previous_values(month),
            statistics: statistics::load_statistics_map(&self.db).await?,
            default_value_date: if month == current {
                self.clock.today()
            } else {
                month.last_day()
            },
        };

        let mut row_data: HashMap<String, Option<f64>> = HashMap::new();
        let mut warnings = Vec::new();

        let pending: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| self.process_source(adapter.as_ref(), &ctx))
            .collect();
        let mut reports = stream::iter(pending).buffered(self.max_concurrency);

        while let Some(report) = reports.next().await {
            let report = report?;
            if let Some(cell) = report.cell {
                row_data.insert(report.key, cell);
            }
            if let Some(warning) = report.warning {
                warnings.push(warning);
            }
        }

        self.ledger
            .partial_upsert_row(self.ledger.data_sheet(), &label, &row_data, max_raw_index)
            .await?;

        if let Err(e) = self.ledger.mirror_dates_into_zscores().await {
            tracing::warn!(error = %e, "Failed to sync z-score dates");
        }

        Ok(warnings)
    }

    async fn process_source(&self, adapter: &dyn SurveyAdapter, ctx: &RunContext) -> IngestResult<SourceReport> {
        let key = header_key(adapter.sheet_header());
        let previous = ctx.previous.get(&key).copied().flatten();

        let Some(&column) = ctx.header_map.get(&key) else {
            tracing::warn!(source = %adapter.name(), header = %adapter.sheet_header(), "Ledger has no column for source");
            let record = NewSourceValue {
                source_name: adapter.name().to_string(),
                source_url: adapter.source_url().to_string(),
                value: None,
                previous_value: previous,
                delta: None,
                status: SourceStatus::MissingHeader,
                carried_forward: false,
                value_date: None,
                message: Some(MISSING_HEADER_MESSAGE.to_string()),
            };
            source_values::insert_source_value(&self.db, ctx.run_id, &record, self.clock.now()).await?;
            return Ok(SourceReport {
                key,
                cell: None,
                warning: None,
            });
        };

        let locked = if ctx.historical {
            ctx.existing_row
                .as_ref()
                .and_then(|row| resolution::locked_cell_value(row.get(column).map(String::as_str)))
        } else {
            None
        };

        let stats = ctx.statistics.get(&key);
        let resolved: Resolution = match locked {
            Some(cell_value) => {
                tracing::debug!(source = %adapter.name(), month = %ctx.month, "Using locked ledger value");
                let mut r = resolution::resolve_locked(cell_value, previous, ctx.month);
                r.apply_validation(validator::validate(r.value, stats));
                r
            }
            None => match adapter.fetch(ctx.month).await {
                Ok(outcome) => {
                    let mut r = resolution::resolve_outcome(outcome, previous);
                    r.apply_validation(validator::validate(r.value, stats));
                    r
                }
                Err(e) => {
                    tracing::warn!(source = %adapter.name(), month = %ctx.month, error = %e, "Source fetch failed");
                    resolution::resolve_failure(&e, previous)
                }
            },
        };

        let value_date = resolved.value_date.unwrap_or(ctx.default_value_date);
        let record = NewSourceValue {
            source_name: adapter.name().to_string(),
            source_url: adapter.source_url().to_string(),
            value: resolved.value,
            previous_value: resolved.previous,
            delta: resolved.delta,
            status: resolved.status,
            carried_forward: resolved.carried_forward,
            value_date: Some(value_date),
            message: resolved.message(),
        };
        source_values::insert_source_value(&self.db, ctx.run_id, &record, self.clock.now()).await?;

        if resolved.advances_schedule() {
            if let Err(e) = self.schedules.advance(adapter.name(), value_date).await {
                tracing::warn!(source = %adapter.name(), error = %e, "Failed to advance release schedule");
            }
        }

        tracing::debug!(
            source = %adapter.name(),
            value = ?resolved.value,
            status = resolved.status.as_str(),
            carried_forward = resolved.carried_forward,
            locked = resolved.locked,
            "Source resolved"
        );

        Ok(SourceReport {
            key,
            cell: Some(resolved.value),
            warning: resolved
                .validation()
                .map(|flag| format!("{}: {}", adapter.sheet_header(), flag)),
        })
    }

    /// Ingest the current month and the `months - 1` before it, newest first
    ///
    /// A failed month is recorded and the rest still run.
    pub async fn run_backfill(&self, months: u32) -> IngestResult<BackfillReport> {
        if !(1..=MAX_BACKFILL_MONTHS).contains(&months) {
            return Err(IngestError::InvalidInput(format!(
                "Invalid months: {} (expected 1-{})",
                months, MAX_BACKFILL_MONTHS
            )));
        }

        let current = self.clock.current_month();
        let mut results = Vec::with_capacity(months as usize);
        for offset in 0..months {
            let target = current.minus_months(offset);
            match self.run_monthly_ingest(Some(target)).await {
                Ok(summary) => results.push(BackfillMonth {
                    month: summary.month,
                    status: RunStatus::Success,
                    error: None,
                }),
                Err(e) => results.push(BackfillMonth {
                    month: target.to_string(),
                    status: RunStatus::Failed,
                    error: Some(e.to_string()),
                }),
            }
        }

        let status = if results.iter().any(|r| r.status == RunStatus::Failed) {
            BackfillStatus::Partial
        } else {
            BackfillStatus::Ok
        };
        tracing::info!(months, status = ?status, "Backfill finished");
        Ok(BackfillReport { status, results })
    }

    /// Write operator-supplied raw values into a month row
    ///
    /// Only the named columns change. The z-score mirror and date sort that
    /// follow are best effort.
    pub async fn apply_manual_values(
        &self,
        month: MonthLabel,
        values: &HashMap<String, f64>,
    ) -> IngestResult<ManualUpdate> {
        if values.is_empty() {
            return Err(IngestError::InvalidInput("values must not be empty".to_string()));
        }
        if let Some((header, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(IngestError::InvalidInput(format!("Value for {} is not a number", header)));
        }

        let data_sheet = self.ledger.data_sheet().to_string();
        let sheet = self.ledger.read_sheet(&data_sheet).await?;
        let max_raw_index = raw_column_bound(&sheet, &self.adapters);
        let label = month.to_string();

        let action = self.ledger.patch_row(&data_sheet, &label, values, max_raw_index).await?;
        tracing::info!(month = %label, headers = values.len(), action = ?action, "Applied manual values");

        if let Err(e) = self.ledger.mirror_dates_into_zscores().await {
            tracing::warn!(error = %e, "Failed to sync z-score dates");
        }
        if let Err(e) = self.ledger.sort_by_date_column(&data_sheet, max_raw_index).await {
            tracing::warn!(error = %e, "Failed to sort data sheet");
        }

        let mut updated_headers: Vec<String> = values.keys().cloned().collect();
        updated_headers.sort();
        Ok(ManualUpdate {
            month: label,
            updated_headers,
            appended: matches!(action, UpsertAction::Appended { .. }),
        })
    }

    /// Reload per-survey statistics from the ledger's meta sheet
    pub async fn refresh_statistics(&self) -> IngestResult<usize> {
        let stats = self.ledger.read_meta_statistics().await?;
        statistics::replace_statistics(&self.db, &stats).await?;
        tracing::debug!(count = stats.len(), "Refreshed survey statistics");
        Ok(stats.len())
    }

    /// Newest runs with their source values and z-scores
    pub async fn recent_runs(&self, limit: u32) -> IngestResult<Vec<RunHistory>> {
        let recent = runs::recent_runs(&self.db, limit).await?;
        let labels: Vec<String> = recent.iter().map(|r| r.month.clone()).collect();

        let zscores = match self.ledger.zscores_for_months(&labels).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read z-scores for history");
                HashMap::new()
            }
        };

        let mut history = Vec::with_capacity(recent.len());
        for run in recent {
            let sources = source_values::list_for_run(&self.db, run.id).await?;
            let month_zscores = zscores.get(&run.month).cloned().unwrap_or_default();
            history.push(RunHistory {
                run,
                sources,
                zscores: month_zscores,
            });
        }
        Ok(history)
    }
}

/// Index of the rightmost ledger column owned by a panel source
///
/// Columns after it hold formulas and are never written.
pub fn raw_column_bound(sheet: &Sheet, adapters: &[Arc<dyn SurveyAdapter>]) -> usize {
    let owned: HashSet<String> = adapters.iter().map(|a| header_key(a.sheet_header())).collect();
    sheet
        .headers()
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, h)| owned.contains(&header_key(h)))
        .map(|(idx, _)| idx)
        .max()
        .unwrap_or(0)
}
