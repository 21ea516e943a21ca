//! FRED time-series adapters

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uix_common::MonthLabel;

use super::{AdapterError, AdapterOutcome, Frequency, SurveyAdapter};

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Observations requested when looking for the latest valid value
const LATEST_LOOKBACK: u32 = 12;

#[derive(Debug, Clone, Deserialize)]
pub struct FredObservation {
    pub date: String,
    pub value: String,
}

impl FredObservation {
    /// FRED marks gaps with `.`
    fn parsed(&self) -> Option<(NaiveDate, f64)> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        let value = self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some((date, value))
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

pub struct FredClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FredClient {
    pub fn new(http: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| FRED_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        }
    }

    pub async fn observations(
        &self,
        series_id: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<FredObservation>, AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::Config("FRED API key not configured".to_string()))?;

        let mut query = vec![
            ("series_id", series_id.to_string()),
            ("api_key", api_key.to_string()),
            ("file_type", "json".to_string()),
        ];
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let url = reqwest::Url::parse_with_params(
            &format!("{}/series/observations", self.base_url),
            &query,
        )
        .map_err(|e| AdapterError::Config(format!("FRED URL: {}", e)))?;

        // The query string carries the API key, so no error may echo the URL
        tracing::debug!(series = %series_id, "Fetching FRED observations");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("FRED series {}: {}", series_id, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
                url: format!("FRED series {}", series_id),
            });
        }

        let body: ObservationsResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(format!("FRED {}: {}", series_id, e.without_url())))?;
        Ok(body.observations)
    }
}

/// How a series is reduced to one monthly value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FredMode {
    /// Most recent valid observation dated on or before month end
    LatestAsOfMonthEnd,
    /// Mean of the month's valid observations, dated month end
    MonthAverage,
}

pub struct FredSeriesAdapter {
    name: String,
    series_id: String,
    source_url: String,
    frequency: Frequency,
    mode: FredMode,
    client: Arc<FredClient>,
}

impl FredSeriesAdapter {
    pub fn new(
        name: &str,
        series_id: &str,
        frequency: Frequency,
        mode: FredMode,
        client: Arc<FredClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            series_id: series_id.to_string(),
            source_url: format!("https://fred.stlouisfed.org/series/{}", series_id),
            frequency,
            mode,
            client,
        }
    }
}

#[async_trait]
impl SurveyAdapter for FredSeriesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_url(&self) -> &str {
        &self.source_url
    }

    fn frequency(&self) -> Frequency {
        self.frequency
    }

    async fn fetch(&self, month: MonthLabel) -> Result<AdapterOutcome, AdapterError> {
        let end = month.last_day().format("%Y-%m-%d").to_string();

        match self.mode {
            FredMode::LatestAsOfMonthEnd => {
                let observations = self
                    .client
                    .observations(
                        &self.series_id,
                        &[
                            ("sort_order", "desc".to_string()),
                            ("limit", LATEST_LOOKBACK.to_string()),
                            ("observation_end", end),
                        ],
                    )
                    .await?;

                let cutoff = month.last_day();
                Ok(observations
                    .iter()
                    .filter_map(FredObservation::parsed)
                    .filter(|(date, _)| *date <= cutoff)
                    .max_by_key(|(date, _)| *date)
                    .map(|(date, value)| AdapterOutcome::observed(value, Some(date)))
                    .unwrap_or_else(AdapterOutcome::missing))
            }
            FredMode::MonthAverage => {
                let start = month.first_day().format("%Y-%m-%d").to_string();
                let observations = self
                    .client
                    .observations(
                        &self.series_id,
                        &[("observation_start", start), ("observation_end", end)],
                    )
                    .await?;

                let values: Vec<f64> = observations
                    .iter()
                    .filter_map(FredObservation::parsed)
                    .map(|(_, value)| value)
                    .collect();
                if values.is_empty() {
                    return Ok(AdapterOutcome::missing());
                }

                let average = values.iter().sum::<f64>() / values.len() as f64;
                Ok(AdapterOutcome::observed(average, Some(month.last_day()))
                    .with_message(format!("Average of {} daily observations", values.len())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_marker_is_skipped() {
        let gap = FredObservation {
            date: "2026-02-01".to_string(),
            value: ".".to_string(),
        };
        assert_eq!(gap.parsed(), None);

        let obs = FredObservation {
            date: "2026-02-01".to_string(),
            value: "57.3".to_string(),
        };
        assert_eq!(obs.parsed(), Some((NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 57.3)));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let client = Arc::new(FredClient::new(
            reqwest::Client::new(),
            Some("http://127.0.0.1:9".to_string()),
            None,
        ));
        let adapter = FredSeriesAdapter::new(
            "University of Michigan Consumer Sentiment",
            "UMCSENT",
            Frequency::Monthly,
            FredMode::LatestAsOfMonthEnd,
            client,
        );

        let result = adapter.fetch(MonthLabel::new(2026, 2).unwrap()).await;
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }
}
