//! Value resolution policy
//!
//! Decides which number a source contributes to a month: a locked ledger
//! cell, the fresh observation, or the prior month's value carried forward.
//! Every function here is pure so the same inputs always resolve the same way.

use chrono::NaiveDate;
use uix_common::MonthLabel;

use crate::adapters::{AdapterError, AdapterOutcome};
use crate::ledger::parse_numeric;
use crate::models::source_value::compute_delta;
use crate::models::SourceStatus;

pub const CARRIED_FORWARD_MESSAGE: &str = "Carried forward prior value";
pub const LOCKED_MESSAGE: &str = "Preserved locked historical value";

/// Resolved contribution of one source to one month
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Option<f64>,
    pub previous: Option<f64>,
    pub delta: Option<f64>,
    pub status: SourceStatus,
    pub carried_forward: bool,
    pub locked: bool,
    pub value_date: Option<NaiveDate>,
    adapter_message: Option<String>,
    validation: Option<String>,
}

/// Locked value of an existing ledger cell
///
/// `None` when the cell is blank (nothing locked). A non-blank cell that is
/// not numeric locks the value to `None`.
pub fn locked_cell_value(cell: Option<&str>) -> Option<Option<f64>> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    Some(parse_numeric(cell))
}

/// A historical month whose ledger cell is already filled
pub fn resolve_locked(cell_value: Option<f64>, previous: Option<f64>, month: MonthLabel) -> Resolution {
    Resolution {
        value: cell_value,
        previous,
        delta: compute_delta(cell_value, previous),
        status: SourceStatus::Success,
        carried_forward: false,
        locked: true,
        value_date: Some(month.last_day()),
        adapter_message: None,
        validation: None,
    }
}

/// An adapter that answered, with or without a usable value
pub fn resolve_outcome(outcome: AdapterOutcome, previous: Option<f64>) -> Resolution {
    let acceptable = matches!(outcome.status, SourceStatus::Success | SourceStatus::Warning);
    let (value, carried_forward) = match outcome.value {
        Some(value) if acceptable && value.is_finite() => (Some(value), false),
        _ => (previous, previous.is_some()),
    };

    Resolution {
        value,
        previous,
        delta: compute_delta(value, previous),
        status: outcome.status,
        carried_forward,
        locked: false,
        value_date: outcome.value_date,
        adapter_message: outcome.message,
        validation: None,
    }
}

/// An adapter that errored: keep the prior value and record the failure
pub fn resolve_failure(error: &AdapterError, previous: Option<f64>) -> Resolution {
    Resolution {
        value: previous,
        previous,
        delta: compute_delta(previous, previous),
        status: SourceStatus::Failed,
        carried_forward: previous.is_some(),
        locked: false,
        value_date: None,
        adapter_message: Some(error.to_string()),
        validation: None,
    }
}

impl Resolution {
    /// Record a validation flag; any flag downgrades the status to `warning`
    pub fn apply_validation(&mut self, flag: Option<String>) {
        if flag.is_some() {
            self.status = SourceStatus::Warning;
        }
        self.validation = flag;
    }

    pub fn validation(&self) -> Option<&str> {
        self.validation.as_deref()
    }

    /// Message parts joined with ` | `, or `None` when there is nothing to say
    pub fn message(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.adapter_message.as_deref(),
            self.validation.as_deref(),
            self.carried_forward.then_some(CARRIED_FORWARD_MESSAGE),
            self.locked.then_some(LOCKED_MESSAGE),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }

    /// Only a genuine new observation moves the release schedule
    pub fn advances_schedule(&self) -> bool {
        !self.carried_forward && !self.locked && self.value.is_some() && self.status != SourceStatus::Failed
    }
}
