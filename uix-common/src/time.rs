//! Month labels and clock utilities
//!
//! The ledger keys every row by a month label such as `Feb 2026`. `MonthLabel`
//! is the typed form of that key; `Clock` lets callers pin "now" in tests.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Calendar month used as the ledger date key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthLabel {
    year: i32,
    month: u32,
}

impl MonthLabel {
    /// Build a label from a year and a 1-based month
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidMonth(format!("month {} out of range", month)));
        }
        Ok(Self { year, month })
    }

    /// Month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `Feb 2026`, `February 2026`, `2026-02` or `2026-02-15`
    pub fn parse(label: &str) -> Result<Self> {
        let trimmed = label.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            return Err(Error::InvalidMonth("empty label".to_string()));
        }

        if let Some(label) = Self::parse_named(&trimmed) {
            return Ok(label);
        }
        if let Ok(date) = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        Err(Error::InvalidMonth(label.to_string()))
    }

    /// `Feb 2026` / `February 2026`, month name in any case
    fn parse_named(text: &str) -> Option<Self> {
        let (name, year) = text.split_once(' ')?;
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if name.len() < 3 {
            return None;
        }
        let month = MONTH_NAMES
            .iter()
            .position(|full| full.starts_with(&name))?;
        let year = year.trim().parse::<i32>().ok()?;
        Self::new(year, month as u32 + 1).ok()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First calendar day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the month
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    /// Following month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Preceding month
    pub fn previous(&self) -> Self {
        self.minus_months(1)
    }

    /// Month `n` months before this one
    pub fn minus_months(&self, n: u32) -> Self {
        let date = self
            .first_day()
            .checked_sub_months(Months::new(n))
            .unwrap_or(NaiveDate::MIN);
        Self::from_date(date)
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day().format("%b %Y"))
    }
}

impl FromStr for MonthLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for MonthLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MonthLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MonthLabel::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Source of "now" for run timestamps, current-month detection and due states
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn current_month(&self) -> MonthLabel {
        MonthLabel::from_date(self.today())
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Noon UTC on `date`
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        Self(Utc.from_utc_datetime(&date.and_time(noon)))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_label() {
        let label = MonthLabel::parse("Feb 2026").unwrap();
        assert_eq!(label.year(), 2026);
        assert_eq!(label.month(), 2);
        assert_eq!(label.to_string(), "Feb 2026");
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_long_names() {
        assert_eq!(
            MonthLabel::parse("  September   2025 ").unwrap(),
            MonthLabel::new(2025, 9).unwrap()
        );
        assert_eq!(MonthLabel::parse("february 2026").unwrap(), MonthLabel::new(2026, 2).unwrap());
        assert_eq!(MonthLabel::parse("Sept 2025").unwrap(), MonthLabel::new(2025, 9).unwrap());
    }

    #[test]
    fn test_parse_iso_forms() {
        assert_eq!(MonthLabel::parse("2026-03").unwrap(), MonthLabel::new(2026, 3).unwrap());
        assert_eq!(MonthLabel::parse("2026-03-17").unwrap(), MonthLabel::new(2026, 3).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(MonthLabel::parse(""), Err(Error::InvalidMonth(_))));
        assert!(MonthLabel::parse("INDEX").is_err());
        assert!(MonthLabel::parse("Ma 2026").is_err());
        assert!(MonthLabel::parse("Marchy 2026").is_err());
        assert!(MonthLabel::new(2026, 13).is_err());
    }

    #[test]
    fn test_month_boundaries() {
        let feb = MonthLabel::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec = MonthLabel::new(2025, 12).unwrap();
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(dec.next(), MonthLabel::new(2026, 1).unwrap());
    }

    #[test]
    fn test_minus_months_crosses_year() {
        let jan = MonthLabel::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), MonthLabel::new(2025, 12).unwrap());
        assert_eq!(jan.minus_months(13), MonthLabel::new(2024, 12).unwrap());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let mut labels = vec![
            MonthLabel::parse("Mar 2026").unwrap(),
            MonthLabel::parse("Dec 2025").unwrap(),
            MonthLabel::parse("Jan 2026").unwrap(),
        ];
        labels.sort();
        let rendered: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(rendered, vec!["Dec 2025", "Jan 2026", "Mar 2026"]);
    }

    #[test]
    fn test_serde_round_trip_uses_label_text() {
        let label = MonthLabel::new(2026, 2).unwrap();
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"Feb 2026\"");
    }

    #[test]
    fn test_fixed_clock_current_month() {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(clock.current_month(), MonthLabel::new(2026, 3).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }
}
