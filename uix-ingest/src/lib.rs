//! uix-ingest library interface
//!
//! Monthly ingestion and approval pipeline for the uncertainty index:
//! survey adapters, value resolution, outlier validation, ledger writes,
//! release schedules and the approval gate, plus a thin HTTP trigger layer.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, IngestError, IngestResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use uix_common::Clock;

use crate::adapters::SurveyAdapter;
use crate::ledger::Ledger;
use crate::services::{ApprovalWorkflow, IngestOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub orchestrator: Arc<IngestOrchestrator>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub clock: Arc<dyn Clock>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        ledger: Ledger,
        adapters: Vec<Arc<dyn SurveyAdapter>>,
        clock: Arc<dyn Clock>,
        max_concurrency: usize,
    ) -> Self {
        let adapters = Arc::new(adapters);
        let orchestrator = IngestOrchestrator::new(
            db.clone(),
            ledger.clone(),
            Arc::clone(&adapters),
            Arc::clone(&clock),
        )
        .with_max_concurrency(max_concurrency);
        let approvals = ApprovalWorkflow::new(db.clone(), ledger, adapters, Arc::clone(&clock));

        Self {
            db,
            orchestrator: Arc::new(orchestrator),
            approvals: Arc::new(approvals),
            startup_time: clock.now(),
            clock,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::ingest_routes())
        .merge(api::approval_routes())
        .merge(api::schedule_routes())
        .merge(api::statistics_routes())
        .merge(api::settings_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
