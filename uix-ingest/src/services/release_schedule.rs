//! Release schedule tracker
//!
//! Each panel source has a cadence and a next expected release date. A
//! genuine new observation moves the date forward in whole cadence steps;
//! carried-forward and locked values leave it alone.

use std::sync::Arc;

use chrono::{Months, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use uix_common::{Clock, Error, Result};

use crate::adapters::{Frequency, SurveyAdapter};
use crate::db::schedules;
use crate::models::SourceReleaseSchedule;

/// First date reached from `current` in `advance_months` steps that is after `reference`
///
/// Never moves backwards; returns `current` unchanged when it is already
/// after `reference` or the cadence is zero.
pub fn next_release_after(current: NaiveDate, advance_months: u32, reference: NaiveDate) -> NaiveDate {
    if advance_months == 0 {
        return current;
    }
    let mut next = current;
    while next <= reference {
        match next.checked_add_months(Months::new(advance_months)) {
            Some(advanced) => next = advanced,
            None => break,
        }
    }
    next
}

/// Schedule as listed for operators, with cadence defaults filled in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub source_name: String,
    pub source_url: String,
    pub frequency: Frequency,
    pub advance_months: u32,
    pub next_expected_release_date: NaiveDate,
    /// False when the values are defaults rather than a stored row
    pub configured: bool,
}

pub struct ReleaseScheduleTracker {
    db: SqlitePool,
    adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>,
    clock: Arc<dyn Clock>,
}

impl ReleaseScheduleTracker {
    pub fn new(db: SqlitePool, adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, adapters, clock }
    }

    /// Move a source's next release date past `reference`
    ///
    /// Returns the new date when it changed. Sources without a schedule row
    /// are left alone.
    pub async fn advance(&self, source_name: &str, reference: NaiveDate) -> Result<Option<NaiveDate>> {
        let Some(schedule) = schedules::get_schedule(&self.db, source_name).await? else {
            tracing::debug!(source = %source_name, "No release schedule to advance");
            return Ok(None);
        };

        let next = next_release_after(schedule.next_expected_release_date, schedule.advance_months, reference);
        if next == schedule.next_expected_release_date {
            return Ok(None);
        }

        schedules::update_next_date(&self.db, source_name, next, self.clock.now()).await?;
        tracing::info!(
            source = %source_name,
            from = %schedule.next_expected_release_date,
            to = %next,
            "Advanced release schedule"
        );
        Ok(Some(next))
    }

    /// Create a default schedule for every panel source that has none
    pub async fn seed(&self) -> Result<usize> {
        let today = self.clock.today();
        let mut inserted = 0;

        for adapter in self.adapters.iter() {
            let advance_months = adapter.frequency().default_advance_months();
            let schedule = SourceReleaseSchedule {
                source_name: adapter.name().to_string(),
                advance_months,
                next_expected_release_date: add_months(today, advance_months),
                updated_at: self.clock.now(),
            };
            if schedules::insert_if_missing(&self.db, &schedule).await? {
                inserted += 1;
            }
        }

        if inserted > 0 {
            tracing::info!(count = inserted, "Seeded release schedules");
        }
        Ok(inserted)
    }

    /// Every panel source with its schedule, in panel order
    pub async fn list(&self) -> Result<Vec<ScheduleEntry>> {
        let stored = schedules::list_schedules(&self.db).await?;
        let today = self.clock.today();

        Ok(self
            .adapters
            .iter()
            .map(|adapter| {
                let schedule = stored.iter().find(|s| s.source_name == adapter.name());
                let advance_months = schedule
                    .map(|s| s.advance_months)
                    .unwrap_or_else(|| adapter.frequency().default_advance_months());
                ScheduleEntry {
                    source_name: adapter.name().to_string(),
                    source_url: adapter.source_url().to_string(),
                    frequency: adapter.frequency(),
                    advance_months,
                    next_expected_release_date: schedule
                        .map(|s| s.next_expected_release_date)
                        .unwrap_or_else(|| add_months(today, advance_months)),
                    configured: schedule.is_some(),
                }
            })
            .collect())
    }

    /// Operator override of a source's cadence and next date
    pub async fn upsert(
        &self,
        source_name: &str,
        advance_months: u32,
        next_expected_release_date: NaiveDate,
    ) -> Result<SourceReleaseSchedule> {
        let source_name = source_name.trim();
        if source_name.is_empty() {
            return Err(Error::InvalidInput("sourceName is required".to_string()));
        }
        if advance_months < 1 {
            return Err(Error::InvalidInput("advanceMonths must be at least 1".to_string()));
        }
        if !self.adapters.iter().any(|a| a.name() == source_name) {
            return Err(Error::NotFound(format!("Unknown sourceName: {}", source_name)));
        }

        let schedule = SourceReleaseSchedule {
            source_name: source_name.to_string(),
            advance_months,
            next_expected_release_date,
            updated_at: self.clock.now(),
        };
        schedules::upsert_schedule(&self.db, &schedule).await?;
        Ok(schedule)
    }
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}
