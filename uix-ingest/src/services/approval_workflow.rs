//! Approval workflow
//!
//! Every read rebuilds the snapshot from the persisted run, its source values
//! and the release schedules, so approvals made by another process are
//! always visible.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use uix_common::{Clock, Error};
use uuid::Uuid;

use super::ingest_orchestrator::raw_column_bound;
use crate::adapters::SurveyAdapter;
use crate::db::{runs, schedules, source_values};
use crate::error::{IngestError, IngestResult};
use crate::ledger::Ledger;
use crate::models::source_value::compute_delta;
use crate::models::{
    ApprovalAction, ApprovalCheck, ApprovalRow, ApprovalSnapshot, ApprovalStatus, DueState, GateState,
    RunStatus, SourceValue,
};

pub struct ApprovalWorkflow {
    db: SqlitePool,
    ledger: Ledger,
    adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>,
    clock: Arc<dyn Clock>,
}

impl ApprovalWorkflow {
    pub fn new(
        db: SqlitePool,
        ledger: Ledger,
        adapters: Arc<Vec<Arc<dyn SurveyAdapter>>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            ledger,
            adapters,
            clock,
        }
    }

    /// Snapshot of the latest run for `month`, or `None` when it was never run
    pub async fn get_snapshot(&self, month: &str) -> IngestResult<Option<ApprovalSnapshot>> {
        let Some(run) = runs::latest_run_for_month(&self.db, month).await? else {
            return Ok(None);
        };

        let values = source_values::list_for_run(&self.db, run.id).await?;
        let schedule_dates: HashMap<String, chrono::NaiveDate> = schedules::list_schedules(&self.db)
            .await?
            .into_iter()
            .map(|s| (s.source_name, s.next_expected_release_date))
            .collect();
        let today = self.clock.today();

        let rows: Vec<ApprovalRow> = values
            .into_iter()
            .map(|value| {
                let next = schedule_dates.get(&value.source_name).copied();
                let (due_state, due_label) = DueState::describe(next, today);
                ApprovalRow {
                    id: value.id,
                    source_name: value.source_name,
                    source_url: value.source_url,
                    value: value.value,
                    previous_value: value.previous_value,
                    delta: value.delta,
                    status: value.status,
                    message: value.message,
                    carried_forward: value.carried_forward,
                    approval_status: value.approval_status,
                    approval_note: value.approval_note,
                    approved_at: value.approved_at,
                    approved_by: value.approved_by,
                    next_expected_release_date: next,
                    due_state,
                    due_label,
                }
            })
            .collect();

        let pending_count = rows
            .iter()
            .filter(|row| row.approval_status != ApprovalStatus::Approved)
            .count();
        let all_approved = !rows.is_empty() && pending_count == 0;
        let gate = if run.status == RunStatus::Success && all_approved {
            GateState::Approved
        } else {
            GateState::PendingApproval
        };

        Ok(Some(ApprovalSnapshot {
            month: run.month,
            ingest_run_id: run.id,
            ingest_status: run.status,
            started_at: run.started_at,
            message: run.message,
            all_approved,
            pending_count,
            source_count: rows.len(),
            gate,
            rows,
        }))
    }

    /// Gate state alone, `NotRun` when the month has no run
    pub async fn gate_state(&self, month: &str) -> IngestResult<GateState> {
        Ok(self
            .get_snapshot(month)
            .await?
            .map(|s| s.gate)
            .unwrap_or(GateState::NotRun))
    }

    /// Whether draft generation may proceed for `month`
    ///
    /// A blocked gate is a normal result carrying a human-readable reason.
    pub async fn assert_month_approved(&self, month: &str) -> IngestResult<ApprovalCheck> {
        let Some(snapshot) = self.get_snapshot(month).await? else {
            return Ok(blocked(format!("No ingest run found for {}. Run scrape first.", month)));
        };
        if snapshot.ingest_status != RunStatus::Success {
            return Ok(blocked(format!("Latest ingest for {} is not successful.", month)));
        }
        if snapshot.source_count == 0 {
            return Ok(blocked(format!("No source values found for {}. Run scrape first.", month)));
        }
        if !snapshot.all_approved {
            let n = snapshot.pending_count;
            return Ok(blocked(format!(
                "Approval pending for {} source value{}.",
                n,
                if n == 1 { "" } else { "s" }
            )));
        }
        Ok(ApprovalCheck::Approved(Box::new(snapshot)))
    }

    /// Apply a reviewer action to one source value
    ///
    /// An edit writes the new figure through to the ledger before touching the
    /// database and always sends the value back to PENDING.
    pub async fn mutate(
        &self,
        source_value_id: Uuid,
        action: ApprovalAction,
        note: Option<&str>,
        actor: &str,
    ) -> IngestResult<SourceValue> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let actor = actor.trim();

        let source_value = source_values::get_source_value(&self.db, source_value_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Source value {}", source_value_id)))?;

        match action {
            ApprovalAction::Approve | ApprovalAction::Reject => {
                if actor.is_empty() {
                    return Err(IngestError::InvalidInput("actor is required".to_string()));
                }
                let status = if action == ApprovalAction::Approve {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Rejected
                };
                source_values::set_approval(&self.db, source_value.id, status, note, actor, self.clock.now())
                    .await?;
                tracing::info!(
                    source = %source_value.source_name,
                    status = status.as_str(),
                    actor = %actor,
                    "Approval recorded"
                );
            }
            ApprovalAction::Edit { value } => {
                self.write_edit_to_ledger(&source_value, value).await?;
                let delta = compute_delta(Some(value), source_value.previous_value);
                source_values::apply_edit(&self.db, source_value.id, value, delta, note).await?;
                tracing::info!(
                    source = %source_value.source_name,
                    from = ?source_value.value,
                    to = value,
                    actor = %actor,
                    "Source value edited, approval reset"
                );
            }
        }

        source_values::get_source_value(&self.db, source_value.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Source value {}", source_value.id)).into())
    }

    async fn write_edit_to_ledger(&self, source_value: &SourceValue, value: f64) -> IngestResult<()> {
        let run = runs::get_run(&self.db, source_value.ingest_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ingest run {}", source_value.ingest_id)))?;

        let header = self
            .adapters
            .iter()
            .find(|a| a.name() == source_value.source_name)
            .map(|a| a.sheet_header().to_string())
            .unwrap_or_else(|| source_value.source_name.clone());

        let data_sheet = self.ledger.data_sheet().to_string();
        let sheet = self.ledger.read_sheet(&data_sheet).await?;
        let max_raw_index = raw_column_bound(&sheet, &self.adapters);

        let values = HashMap::from([(header, value)]);
        self.ledger.patch_row(&data_sheet, &run.month, &values, max_raw_index).await?;

        // The cell is written; follow-up ledger upkeep must not block the approval reset
        if let Err(e) = self.ledger.mirror_dates_into_zscores().await {
            tracing::warn!(error = %e, "Mirroring dates into z-score sheet failed after edit");
        }
        if let Err(e) = self.ledger.sort_by_date_column(&data_sheet, max_raw_index).await {
            tracing::warn!(sheet = %data_sheet, error = %e, "Sorting ledger failed after edit");
        }
        Ok(())
    }
}

fn blocked(reason: String) -> ApprovalCheck {
    ApprovalCheck::Blocked { reason }
}
