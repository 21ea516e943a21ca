//! Outlier validation of resolved values
//!
//! A flag never blocks ingestion: the orchestrator downgrades the source to
//! `warning` and appends the flag to the run's warning list.

use crate::models::SourceStatistics;

/// |z| at or above which a value is reported as an outlier
pub const OUTLIER_Z_THRESHOLD: f64 = 4.0;

/// First validation flag raised for `value`, if any
///
/// Checks run in order: missing value, outlier against the survey's
/// mean/stdev (skipped when either is unknown or stdev is zero), negative value.
pub fn validate(value: Option<f64>, stats: Option<&SourceStatistics>) -> Option<String> {
    let Some(value) = value else {
        return Some("Missing value".to_string());
    };

    if let Some(z) = stats.and_then(|s| z_score(value, s)) {
        if z.abs() >= OUTLIER_Z_THRESHOLD {
            return Some(format!("Outlier detected (z={:.2})", z));
        }
    }

    if value < 0.0 {
        return Some("Negative value".to_string());
    }

    None
}

/// `(value - mean) / stdev`, or `None` without usable statistics
pub fn z_score(value: f64, stats: &SourceStatistics) -> Option<f64> {
    let mean = stats.mean?;
    let stdev = stats.stdev?;
    if stdev <= 0.0 || !stdev.is_finite() || !mean.is_finite() {
        return None;
    }
    Some((value - mean) / stdev)
}
