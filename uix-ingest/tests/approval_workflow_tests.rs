//! Approval workflow tests
//!
//! Snapshots, reviewer actions and the draft gate over real ingest runs.

mod helpers;

use helpers::*;
use uix_common::Error;
use uix_ingest::db::{runs, source_values};
use uix_ingest::models::{
    ApprovalAction, ApprovalStatus, DueState, GateState, IngestRun, SourceValue,
};
use uix_ingest::ledger::LedgerOp;
use uix_ingest::IngestError;
use uuid::Uuid;

const UMICH: &str = "University of Michigan Consumer Sentiment";
const REVIEWER: &str = "analyst@example.com";

async fn run_march(h: &Harness) -> Vec<SourceValue> {
    let summary = h.orchestrator.run_monthly_ingest(None).await.unwrap();
    source_values::list_for_run(&h.db, summary.ingest_run_id).await.unwrap()
}

async fn approve_all(h: &Harness, values: &[SourceValue]) {
    for value in values {
        h.approvals
            .mutate(value.id, ApprovalAction::Approve, None, REVIEWER)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_month_without_run_is_blocked() {
    let h = Harness::new(&[]).await;

    assert!(h.approvals.get_snapshot("Mar 2026").await.unwrap().is_none());
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::NotRun);

    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert!(!check.is_ok());
    assert_eq!(check.reason(), Some("No ingest run found for Mar 2026. Run scrape first."));
}

#[tokio::test]
async fn test_fresh_run_is_pending_for_every_source() {
    let h = Harness::new(&[]).await;
    run_march(&h).await;

    let snapshot = h.approvals.get_snapshot("Mar 2026").await.unwrap().unwrap();
    assert_eq!(snapshot.source_count, 14);
    assert_eq!(snapshot.pending_count, 14);
    assert!(!snapshot.all_approved);
    assert_eq!(snapshot.gate, GateState::PendingApproval);
    assert!(snapshot
        .rows
        .iter()
        .all(|row| row.approval_status == ApprovalStatus::Pending));

    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert_eq!(check.reason(), Some("Approval pending for 14 source values."));
}

#[tokio::test]
async fn test_gate_opens_once_everything_is_approved() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;

    approve_all(&h, &values[1..]).await;
    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert_eq!(check.reason(), Some("Approval pending for 1 source value."));

    let approved = h
        .approvals
        .mutate(values[0].id, ApprovalAction::Approve, Some("  looks right "), REVIEWER)
        .await
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.approval_note.as_deref(), Some("looks right"));
    assert_eq!(approved.approved_by.as_deref(), Some(REVIEWER));
    assert!(approved.approved_at.is_some());

    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert!(check.is_ok());
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::Approved);
}

#[tokio::test]
async fn test_rejected_value_keeps_gate_closed() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;
    approve_all(&h, &values).await;

    let rejected = h
        .approvals
        .mutate(values[3].id, ApprovalAction::Reject, Some("   "), REVIEWER)
        .await
        .unwrap();
    assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
    assert_eq!(rejected.approval_note, None);

    let snapshot = h.approvals.get_snapshot("Mar 2026").await.unwrap().unwrap();
    assert_eq!(snapshot.pending_count, 1);
    assert_eq!(snapshot.gate, GateState::PendingApproval);
}

#[tokio::test]
async fn test_edit_writes_through_and_resets_approval() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;
    approve_all(&h, &values).await;

    let umich = values.iter().find(|v| v.source_name == UMICH).unwrap();
    let edited = h
        .approvals
        .mutate(umich.id, ApprovalAction::Edit { value: 88.5 }, Some("revised release"), REVIEWER)
        .await
        .unwrap();

    assert_eq!(edited.value, Some(88.5));
    assert_eq!(edited.previous_value, Some(90.0));
    assert_eq!(edited.delta, Some(-1.5));
    assert_eq!(edited.approval_status, ApprovalStatus::Pending);
    assert_eq!(edited.approval_note.as_deref(), Some("revised release"));

    assert_eq!(h.data_row("Mar 2026").await[1], "88.5");
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::PendingApproval);
}

#[tokio::test]
async fn test_edit_fails_when_ledger_rejects_the_write() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;
    h.backend.fail_on_sheet(LedgerOp::Update, "Data").await;

    let umich = values.iter().find(|v| v.source_name == UMICH).unwrap();
    let err = h
        .approvals
        .mutate(umich.id, ApprovalAction::Edit { value: 1.0 }, None, REVIEWER)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Ledger(_)));

    let stored = source_values::get_source_value(&h.db, umich.id).await.unwrap().unwrap();
    assert_eq!(stored.value, Some(100.0));
}

#[tokio::test]
async fn test_edit_resets_approval_when_mirror_upkeep_fails() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;
    approve_all(&h, &values).await;
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::Approved);

    h.backend.fail_on_sheet(LedgerOp::Read, "zscores").await;

    let umich = values.iter().find(|v| v.source_name == UMICH).unwrap();
    let edited = h
        .approvals
        .mutate(umich.id, ApprovalAction::Edit { value: 1.0 }, None, REVIEWER)
        .await
        .unwrap();
    assert_eq!(edited.value, Some(1.0));
    assert_eq!(edited.approval_status, ApprovalStatus::Pending);

    // Ledger and database agree on the new figure
    assert_eq!(h.data_row("Mar 2026").await[1], "1");
    let stored = source_values::get_source_value(&h.db, umich.id).await.unwrap().unwrap();
    assert_eq!(stored.value, Some(1.0));

    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert!(!check.is_ok());
    assert_eq!(check.reason(), Some("Approval pending for 1 source value."));
}

#[tokio::test]
async fn test_failed_run_is_not_successful() {
    let h = Harness::new(&[]).await;
    h.backend.fail_on_sheet(LedgerOp::Append, "Data").await;
    assert!(h.orchestrator.run_monthly_ingest(None).await.is_err());

    let check = h.approvals.assert_month_approved("Mar 2026").await.unwrap();
    assert_eq!(check.reason(), Some("Latest ingest for Mar 2026 is not successful."));
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::PendingApproval);
}

#[tokio::test]
async fn test_run_without_sources_is_blocked() {
    let h = Harness::new(&[]).await;
    let run = IngestRun::start("Apr 2026".to_string(), chrono::Utc::now());
    runs::insert_run(&h.db, &run).await.unwrap();

    let snapshot = h.approvals.get_snapshot("Apr 2026").await.unwrap().unwrap();
    assert_eq!(snapshot.source_count, 0);
    assert!(!snapshot.all_approved);

    let check = h.approvals.assert_month_approved("Apr 2026").await.unwrap();
    assert_eq!(check.reason(), Some("No source values found for Apr 2026. Run scrape first."));
}

#[tokio::test]
async fn test_snapshot_carries_due_labels() {
    let h = Harness::new(&[]).await;
    run_march(&h).await;

    let snapshot = h.approvals.get_snapshot("Mar 2026").await.unwrap().unwrap();
    let umich = snapshot.rows.iter().find(|r| r.source_name == UMICH).unwrap();
    assert_eq!(umich.due_state, DueState::Unknown);
    assert_eq!(umich.due_label, "No release date configured");

    h.orchestrator.schedules().seed().await.unwrap();
    let snapshot = h.approvals.get_snapshot("Mar 2026").await.unwrap().unwrap();
    let umich = snapshot.rows.iter().find(|r| r.source_name == UMICH).unwrap();
    assert_eq!(umich.due_state, DueState::Upcoming);
    assert_eq!(umich.due_label, "Upcoming · April 10, 2026");
    assert_eq!(umich.next_expected_release_date, Some(date(2026, 4, 10)));
}

#[tokio::test]
async fn test_latest_run_wins() {
    let h = Harness::new(&[]).await;
    let first = run_march(&h).await;
    approve_all(&h, &first).await;
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::Approved);

    run_march(&h).await;
    assert_eq!(h.approvals.gate_state("Mar 2026").await.unwrap(), GateState::PendingApproval);
}

#[tokio::test]
async fn test_invalid_mutations() {
    let h = Harness::new(&[]).await;
    let values = run_march(&h).await;

    let err = h
        .approvals
        .mutate(Uuid::new_v4(), ApprovalAction::Approve, None, REVIEWER)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Common(Error::NotFound(_))));

    let err = h
        .approvals
        .mutate(values[0].id, ApprovalAction::Approve, None, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidInput(_)));
}
