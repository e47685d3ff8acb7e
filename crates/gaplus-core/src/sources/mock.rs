//! Deterministic offline source
//!
//! Produces the same rows for the same descriptor, dated backwards from a
//! fixed anchor day, so demos and tests never depend on the network.

use super::{sum_totals, SourceAdapter};
use crate::error::SourceError;
use crate::models::{DataSource, NormalizedResult, QueryDescriptor, ResultMetadata, Row, Scalar};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

/// Most rows a mock result ever has
const MAX_MOCK_ROWS: usize = 10;

/// Baselines for well-known metrics; anything else starts at 100
fn metric_baseline(name: &str) -> Option<i64> {
    match name {
        "sessions" => Some(1234),
        "totalUsers" | "activeUsers" | "users" => Some(890),
        "screenPageViews" | "pageviews" => Some(5678),
        "conversions" => Some(45),
        _ => None,
    }
}

pub struct MockAdapter {
    anchor: NaiveDate,
    /// Slot this adapter fills; rows are always labeled mock
    slot: DataSource,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::standing_in_for(DataSource::Mock)
    }

    /// Mock rows served from another source's slot (offline mode)
    pub fn standing_in_for(slot: DataSource) -> Self {
        Self {
            anchor: NaiveDate::from_ymd_opt(2024, 1, 21).unwrap_or_default(),
            slot,
        }
    }

    /// Value of `metric` on row `i` (row 0 is the most recent day)
    fn metric_value(metric: &str, i: usize) -> Scalar {
        let i = i as i64;
        if metric.ends_with("Rate") {
            return Scalar::Float(0.035 - 0.001 * i as f64);
        }
        match metric_baseline(metric) {
            // Older rows are smaller, so the series grows towards the anchor
            Some(base) => Scalar::Int((base - i * (base / 20)).max(0)),
            None => Scalar::Int(100 + i * 10),
        }
    }

    fn build_rows(&self, descriptor: &QueryDescriptor) -> Vec<Row> {
        let count = MAX_MOCK_ROWS.min(descriptor.limit as usize);
        (0..count)
            .map(|i| {
                let mut row = Row::new();
                for dim in descriptor.dimension_names() {
                    let value = match dim {
                        "date" => (self.anchor - Duration::days(i as i64))
                            .format("%Y%m%d")
                            .to_string(),
                        "pagePath" => format!("/page-{}", i + 1),
                        _ => format!("value-{}", i + 1),
                    };
                    row.insert(dim.to_string(), Scalar::Text(value));
                }
                for metric in descriptor.metric_names() {
                    row.insert(metric.to_string(), Self::metric_value(metric, i));
                }
                row
            })
            .collect()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source(&self) -> DataSource {
        self.slot
    }

    async fn run(
        &self,
        descriptor: &QueryDescriptor,
        target_id: &str,
    ) -> Result<NormalizedResult, SourceError> {
        let rows = self.build_rows(descriptor);
        let totals = sum_totals(&rows, descriptor.metric_names());
        Ok(NormalizedResult::new(
            rows,
            totals,
            ResultMetadata::new(DataSource::Mock, target_id),
        ))
    }

    fn is_available(&self) -> bool {
        true
    }
}
