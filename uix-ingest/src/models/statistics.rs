//! Per-survey rolling statistics used by outlier validation

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatistics {
    /// Survey name as it appears in the ledger header row
    pub survey: String,
    pub weight: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub direction: Option<String>,
}
