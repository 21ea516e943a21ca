//! Pipeline services
//!
//! Resolution and validation are pure; the orchestrator, approval workflow
//! and schedule tracker own the database and ledger side effects.

pub mod approval_workflow;
pub mod ingest_orchestrator;
pub mod release_schedule;
pub mod resolution;
pub mod validator;

pub use approval_workflow::ApprovalWorkflow;
pub use ingest_orchestrator::{
    BackfillMonth, BackfillReport, BackfillStatus, IngestOrchestrator, IngestSummary, ManualUpdate, RunHistory,
};
pub use release_schedule::{ReleaseScheduleTracker, ScheduleEntry};
