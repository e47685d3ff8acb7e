//! Source-agnostic query descriptor
//!
//! A descriptor is built once per request (by the NL parser upstream, or by
//! deserializing JSON) and never mutated afterwards.

use crate::error::{CoreError, Result};
use crate::models::dates::DateRange;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("field name pattern compiles"));

/// Maximum number of date ranges (two means period-over-period)
pub const MAX_DATE_RANGES: usize = 2;

/// Default row limit when the caller does not set one
pub const DEFAULT_LIMIT: u32 = 10;

/// Reference to a metric by API name (e.g. `totalUsers`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricRef {
    pub name: String,
}

/// Reference to a dimension by API name (e.g. `date`, `pagePath`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionRef {
    pub name: String,
}

impl MetricRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DimensionRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Normalized description of what to fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub metrics: Vec<MetricRef>,
    #[serde(default)]
    pub dimensions: Vec<DimensionRef>,
    #[serde(default = "default_date_ranges")]
    pub date_ranges: Vec<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_date_ranges() -> Vec<DateRange> {
    vec![DateRange::default()]
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl QueryDescriptor {
    /// Descriptor over the given metrics with default window and limit
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(MetricRef::new).collect(),
            dimensions: Vec::new(),
            date_ranges: default_date_ranges(),
            filters: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions = dimensions.into_iter().map(DimensionRef::new).collect();
        self
    }

    pub fn with_date_ranges(mut self, ranges: Vec<DateRange>) -> Self {
        self.date_ranges = ranges;
        self
    }

    pub fn with_filters(mut self, filters: BTreeMap<String, serde_json::Value>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name.as_str())
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn first_metric(&self) -> Option<&str> {
        self.metrics.first().map(|m| m.name.as_str())
    }

    /// Filters present and non-empty
    pub fn has_filters(&self) -> bool {
        self.filters.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Any date range ends on the live day
    pub fn ends_today(&self) -> bool {
        self.date_ranges.iter().any(|r| r.end_date.is_today())
    }

    /// Short label describing the query shape, used in logs and metadata
    pub fn query_type(&self) -> String {
        match self.dimensions.as_slice() {
            [] => "aggregated_metrics".to_string(),
            [single] => format!("single_dimension_{}", single.name),
            many => format!("multi_dimension_{}_dims", many.len()),
        }
    }

    /// Check structural invariants, resolving relative dates against `today`
    ///
    /// # Errors
    /// `CoreError::Validation` naming the first violated rule.
    pub fn validate_at(&self, today: NaiveDate) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(CoreError::validation("at least one metric is required"));
        }

        for name in self.metric_names().chain(self.dimension_names()) {
            if !FIELD_NAME.is_match(name) {
                return Err(CoreError::validation(format!(
                    "invalid field name '{}'",
                    name
                )));
            }
        }

        if self.date_ranges.is_empty() || self.date_ranges.len() > MAX_DATE_RANGES {
            return Err(CoreError::validation(format!(
                "expected 1 or {} date ranges, got {}",
                MAX_DATE_RANGES,
                self.date_ranges.len()
            )));
        }

        for range in &self.date_ranges {
            if !range.is_representable(today) {
                return Err(CoreError::validation(format!(
                    "date range {}..{} is out of range",
                    range.start_date, range.end_date
                )));
            }
            if range.is_inverted(today) {
                return Err(CoreError::validation(format!(
                    "date range {}..{} starts after it ends",
                    range.start_date, range.end_date
                )));
            }
        }

        if self.limit < 1 {
            return Err(CoreError::validation("limit must be at least 1"));
        }

        Ok(())
    }

    /// [`validate_at`](Self::validate_at) against the local calendar day
    pub fn validate(&self) -> Result<()> {
        self.validate_at(chrono::Local::now().date_naive())
    }
}
