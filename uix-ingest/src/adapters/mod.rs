//! Survey source adapters
//!
//! One adapter per panel source, all behind the [`SurveyAdapter`] trait. The
//! orchestrator holds them as a list and never dispatches on source name.
//!
//! Contract: "no data for this period" is `Ok` with status `missing`; only
//! transport and parse failures are `Err`. Observations dated after the end
//! of the target month are never returned.

pub mod atlanta_fed;
pub mod cache;
pub mod cfo_survey;
pub mod fred;
pub mod panel;
pub mod scrape;
pub mod workbook;

pub use cache::TtlCache;
pub use panel::{default_panel, PanelConfig};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uix_common::MonthLabel;

use crate::models::SourceStatus;

/// Publication cadence of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Daily => "daily",
        }
    }

    /// Default release-schedule step in months
    pub fn default_advance_months(&self) -> u32 {
        match self {
            Frequency::Quarterly => 3,
            Frequency::Monthly | Frequency::Daily => 1,
        }
    }
}

/// What an adapter found for a month
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutcome {
    pub value: Option<f64>,
    pub value_date: Option<NaiveDate>,
    pub status: SourceStatus,
    pub message: Option<String>,
}

impl AdapterOutcome {
    pub fn observed(value: f64, value_date: Option<NaiveDate>) -> Self {
        Self {
            value: Some(value),
            value_date,
            status: SourceStatus::Success,
            message: None,
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            value_date: None,
            status: SourceStatus::Missing,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Network(err.to_string())
    }
}

#[async_trait]
pub trait SurveyAdapter: Send + Sync {
    /// Source name, stored on every source value row
    fn name(&self) -> &str;

    /// Ledger column header this source writes
    fn sheet_header(&self) -> &str {
        self.name()
    }

    /// Human-facing page for the source
    fn source_url(&self) -> &str;

    fn frequency(&self) -> Frequency;

    /// Latest observation at or before the end of `month`
    async fn fetch(&self, month: MonthLabel) -> Result<AdapterOutcome, AdapterError>;
}

/// GET `url` and fail on any non-2xx status
pub(crate) async fn get_checked(
    http: &reqwest::Client,
    url: &str,
) -> Result<reqwest::Response, AdapterError> {
    tracing::debug!(url = %url, "Fetching source");
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Shared HTTP client for adapters
pub fn build_http_client(timeout: std::time::Duration) -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
        )
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterError::Config(format!("HTTP client: {}", e)))
}
