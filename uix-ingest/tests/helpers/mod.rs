//! Test helper utilities
//!
//! Shared fixtures for uix-ingest integration tests: an in-memory database,
//! an in-memory ledger laid out like the production spreadsheet, scripted
//! survey adapters and a pinned clock.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use uix_common::{Clock, FixedClock, MonthLabel};
use uix_ingest::adapters::{AdapterError, AdapterOutcome, Frequency, SurveyAdapter};
use uix_ingest::ledger::{InMemoryLedger, Ledger, LedgerBackend};
use uix_ingest::services::{ApprovalWorkflow, IngestOrchestrator};

/// Ledger headers of the fourteen panel sources, in column order
pub const PANEL: [(&str, Frequency); 14] = [
    ("University of Michigan Consumer Sentiment", Frequency::Monthly),
    ("Conference Board Consumer Confidence", Frequency::Monthly),
    ("NY Fed Consumer Expectations - inflation", Frequency::Monthly),
    ("Duke/Fed CFO Survey Optimism - Economy", Frequency::Quarterly),
    ("NFIB Small Business Optimism", Frequency::Monthly),
    ("Business Roundtable CEO Outlook", Frequency::Quarterly),
    ("Duke/Fed CFO Survey Optimism - Own Firm", Frequency::Quarterly),
    ("EY-Parthenon CEO Confidence", Frequency::Quarterly),
    ("Deloitte CFO Confidence", Frequency::Quarterly),
    ("Economic Policy Uncertainty Index (month average)", Frequency::Daily),
    ("NFIB Uncertainty Index", Frequency::Monthly),
    ("Atlanta Fed SBU Empgrowth Uncert", Frequency::Monthly),
    ("Atlanta Fed SBU RevGrowth Uncert", Frequency::Monthly),
    ("OECD Composite Consumer Confidence for United States", Frequency::Monthly),
];

/// Index of the first formula column in the fixture data sheet
pub const COMPOSITE_COL: usize = 15;

pub async fn create_test_db() -> SqlitePool {
    uix_common::db::init_memory_database().await.unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn month(label: &str) -> MonthLabel {
    MonthLabel::parse(label).unwrap()
}

/// Clock pinned to 10 March 2026
pub fn march_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::at_date(date(2026, 3, 10)))
}

/// What a scripted adapter does when fetched
#[derive(Debug, Clone)]
pub enum Script {
    Value(f64),
    ValueOn(f64, NaiveDate),
    Missing,
    Fail(String),
}

pub struct StubAdapter {
    name: String,
    frequency: Frequency,
    script: std::sync::Mutex<Script>,
    calls: AtomicUsize,
}

impl StubAdapter {
    pub fn new(name: &str, frequency: Frequency, script: Script) -> Self {
        Self {
            name: name.to_string(),
            frequency,
            script: std::sync::Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }
}

#[async_trait]
impl SurveyAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_url(&self) -> &str {
        "https://example.test/source"
    }

    fn frequency(&self) -> Frequency {
        self.frequency
    }

    async fn fetch(&self, month: MonthLabel) -> Result<AdapterOutcome, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Value(v) => Ok(AdapterOutcome::observed(v, Some(month.last_day()))),
            Script::ValueOn(v, d) => Ok(AdapterOutcome::observed(v, Some(d))),
            Script::Missing => Ok(AdapterOutcome::missing()),
            Script::Fail(msg) => Err(AdapterError::Parse(msg)),
        }
    }
}

/// Scripted panel: source `i` returns `100 + i` unless overridden
pub fn stub_panel(overrides: &[(&str, Script)]) -> Vec<Arc<StubAdapter>> {
    PANEL
        .iter()
        .enumerate()
        .map(|(i, (name, frequency))| {
            let script = overrides
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s.clone())
                .unwrap_or(Script::Value(100.0 + i as f64));
            Arc::new(StubAdapter::new(name, *frequency, script))
        })
        .collect()
}

pub fn as_dyn(panel: &[Arc<StubAdapter>]) -> Vec<Arc<dyn SurveyAdapter>> {
    panel.iter().map(|a| Arc::clone(a) as Arc<dyn SurveyAdapter>).collect()
}

pub fn header_row() -> Vec<String> {
    let mut row = vec!["DATE".to_string()];
    row.extend(PANEL.iter().map(|(name, _)| name.to_string()));
    row.push("Composite".to_string());
    row
}

/// Data row with every source set to `base + i` and the composite formula
pub fn data_row(label: &str, base: f64, sheet_row: usize) -> Vec<String> {
    let mut row = vec![label.to_string()];
    row.extend((0..PANEL.len()).map(|i| (base + i as f64).to_string()));
    row.push(format!("=AVERAGE(B{r}:O{r})", r = sheet_row));
    row
}

/// Ledger with `Data` rows for Jan and Feb 2026, a z-score mirror and stats
pub fn fixture_backend() -> Arc<InMemoryLedger> {
    Arc::new(
        InMemoryLedger::new()
            .with_sheet(
                "Data",
                vec![header_row(), data_row("Jan 2026", 80.0, 2), data_row("Feb 2026", 90.0, 3)],
            )
            .with_sheet(
                "zscores",
                vec![
                    vec!["DATE", "Index"],
                    vec!["Jan 2026", "=Data!P2"],
                    vec!["Feb 2026", "=Data!P3"],
                ],
            )
            .with_sheet(
                "Meta",
                vec![
                    vec!["Survey", "Weight", "Mean", "Stdev", "Direction"],
                    vec!["NFIB Uncertainty Index", "0.1", "100", "10", "higher"],
                ],
            ),
    )
}

pub fn ledger_over(backend: &Arc<InMemoryLedger>) -> Ledger {
    let backend: Arc<dyn LedgerBackend> = Arc::clone(backend) as Arc<dyn LedgerBackend>;
    Ledger::new(backend, "Data", "zscores", "Meta")
}

/// Everything a pipeline test needs, wired together
pub struct Harness {
    pub db: SqlitePool,
    pub backend: Arc<InMemoryLedger>,
    pub panel: Vec<Arc<StubAdapter>>,
    pub orchestrator: IngestOrchestrator,
    pub approvals: ApprovalWorkflow,
}

impl Harness {
    pub async fn new(overrides: &[(&str, Script)]) -> Self {
        Self::with_backend(fixture_backend(), overrides).await
    }

    pub async fn with_backend(backend: Arc<InMemoryLedger>, overrides: &[(&str, Script)]) -> Self {
        let db = create_test_db().await;
        let panel = stub_panel(overrides);
        let adapters = Arc::new(as_dyn(&panel));
        let clock = march_clock();
        let ledger = ledger_over(&backend);

        let orchestrator = IngestOrchestrator::new(db.clone(), ledger.clone(), Arc::clone(&adapters), Arc::clone(&clock));
        let approvals = ApprovalWorkflow::new(db.clone(), ledger, adapters, clock);

        Self {
            db,
            backend,
            panel,
            orchestrator,
            approvals,
        }
    }

    /// Blank one source's cell in an existing data row
    pub async fn blank_cell(&self, label: &str, source: &str) {
        let mut rows = self.backend.sheet("Data").await.unwrap();
        let col = rows[0].iter().position(|h| h == source).unwrap();
        let row = rows.iter_mut().find(|r| r[0] == label).unwrap();
        row[col] = String::new();
        self.backend.set_sheet("Data", rows).await;
    }

    pub fn adapter(&self, name: &str) -> &Arc<StubAdapter> {
        self.panel.iter().find(|a| a.name() == name).unwrap()
    }

    /// Data sheet row for `label`, as raw cell text
    pub async fn data_row(&self, label: &str) -> Vec<String> {
        self.backend
            .sheet("Data")
            .await
            .unwrap()
            .into_iter()
            .find(|row| row.first().map(String::as_str) == Some(label))
            .unwrap_or_default()
    }
}
