//! Date range endpoints and named presets
//!
//! Endpoints follow the reporting API vocabulary: `today`, `yesterday`,
//! `NdaysAgo` or an absolute `YYYY-MM-DD`. They stay symbolic until resolved
//! against an injected "today" so routing decisions remain reproducible.

use chrono::{Datelike, Days, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One endpoint of a date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateSpec {
    Today,
    Yesterday,
    /// `NdaysAgo`
    DaysAgo(u32),
    /// `YYYY-MM-DD`
    Absolute(NaiveDate),
}

impl DateSpec {
    /// Resolve to a calendar date relative to `today`
    ///
    /// None when the lookback runs past the earliest representable date.
    pub fn checked_resolve(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateSpec::Today => Some(today),
            DateSpec::Yesterday => today.checked_sub_days(Days::new(1)),
            DateSpec::DaysAgo(n) => today.checked_sub_days(Days::new(u64::from(*n))),
            DateSpec::Absolute(date) => Some(*date),
        }
    }

    /// [`checked_resolve`](Self::checked_resolve), clamped to the earliest date
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        self.checked_resolve(today).unwrap_or(NaiveDate::MIN)
    }

    /// Whole days between this endpoint and `today` (0 for today or later)
    pub fn days_before(&self, today: NaiveDate) -> i64 {
        (today - self.resolve(today)).num_days().max(0)
    }

    pub fn is_today(&self) -> bool {
        matches!(self, DateSpec::Today)
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSpec::Today => f.write_str("today"),
            DateSpec::Yesterday => f.write_str("yesterday"),
            DateSpec::DaysAgo(n) => write!(f, "{}daysAgo", n),
            DateSpec::Absolute(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for DateSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "today" => return Ok(DateSpec::Today),
            "yesterday" => return Ok(DateSpec::Yesterday),
            _ => {}
        }

        if let Some(days) = s.strip_suffix("daysAgo") {
            return days
                .parse::<u32>()
                .map(DateSpec::DaysAgo)
                .map_err(|_| format!("invalid relative date '{}'", s));
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DateSpec::Absolute)
            .map_err(|_| format!("invalid date '{}' (expected today, yesterday, NdaysAgo or YYYY-MM-DD)", s))
    }
}

impl TryFrom<String> for DateSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateSpec> for String {
    fn from(spec: DateSpec) -> Self {
        spec.to_string()
    }
}

/// Inclusive date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: DateSpec,
    pub end_date: DateSpec,
}

impl DateRange {
    pub fn new(start_date: DateSpec, end_date: DateSpec) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// `NdaysAgo..today`
    pub fn last_days(days: u32) -> Self {
        Self::new(DateSpec::DaysAgo(days), DateSpec::Today)
    }

    /// Resolve both endpoints against `today`
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (self.start_date.resolve(today), self.end_date.resolve(today))
    }

    /// Days from start to end (negative when inverted)
    pub fn span_days(&self, today: NaiveDate) -> i64 {
        let (start, end) = self.resolve(today);
        (end - start).num_days()
    }

    /// Both endpoints resolve to representable dates
    pub fn is_representable(&self, today: NaiveDate) -> bool {
        self.start_date.checked_resolve(today).is_some()
            && self.end_date.checked_resolve(today).is_some()
    }

    /// Start resolves after end
    pub fn is_inverted(&self, today: NaiveDate) -> bool {
        let (start, end) = self.resolve(today);
        start > end
    }

    /// Build a range from a named preset
    ///
    /// Unknown names fall back to `last_30_days`.
    pub fn preset(name: &str, today: NaiveDate) -> Self {
        let first_of_month = today.with_day(1).unwrap_or(today);
        let last_of_prev_month = first_of_month - Duration::days(1);

        match name {
            "today" => Self::new(DateSpec::Today, DateSpec::Today),
            "yesterday" => Self::new(DateSpec::Yesterday, DateSpec::Yesterday),
            "last_7_days" => Self::last_days(7),
            "last_90_days" => Self::last_days(90),
            "this_month" => Self::new(DateSpec::Absolute(first_of_month), DateSpec::Today),
            "last_month" => Self::new(
                DateSpec::Absolute(last_of_prev_month.with_day(1).unwrap_or(last_of_prev_month)),
                DateSpec::Absolute(last_of_prev_month),
            ),
            "this_year" => match NaiveDate::from_ymd_opt(today.year(), 1, 1) {
                Some(jan1) => Self::new(DateSpec::Absolute(jan1), DateSpec::Today),
                None => Self::last_days(30),
            },
            "last_year" => match (
                NaiveDate::from_ymd_opt(today.year() - 1, 1, 1),
                NaiveDate::from_ymd_opt(today.year() - 1, 12, 31),
            ) {
                (Some(start), Some(end)) => {
                    Self::new(DateSpec::Absolute(start), DateSpec::Absolute(end))
                }
                _ => Self::last_days(30),
            },
            _ => Self::last_days(30),
        }
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::last_days(30)
    }
}
