//! Data models for uix-ingest
//!
//! Persisted records (ingest runs, source values, release schedules,
//! statistics) and the derived approval snapshot.

pub mod approval;
pub mod ingest_run;
pub mod schedule;
pub mod source_value;
pub mod statistics;

pub use approval::{ApprovalAction, ApprovalCheck, ApprovalRow, ApprovalSnapshot, GateState};
pub use ingest_run::{IngestRun, RunStatus};
pub use schedule::{DueState, SourceReleaseSchedule};
pub use source_value::{ApprovalStatus, NewSourceValue, SourceStatus, SourceValue};
pub use statistics::SourceStatistics;
