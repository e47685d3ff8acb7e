//! Outlier detection for unusual spikes or drops in a metric series
//!
//! Uses the interquartile-range fence rather than z-scores, so a single large
//! spike cannot hide itself by inflating the standard deviation.

use super::extract::SeriesPoint;
use super::statistics::{median, quartiles, sample_std_dev};
use serde::{Deserialize, Serialize};

/// Fence width in IQRs
const IQR_FENCE: f64 = 1.5;

/// Cap on reported severity
const MAX_SEVERITY: f64 = 3.0;

/// Which side of the fence a point fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    OutlierHigh,
    OutlierLow,
}

/// Flagged observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Position in the date-sorted series
    pub index: usize,
    pub date: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Distance from the median in standard deviations, capped at 3
    pub severity: f64,
}

/// Detect outliers in a date-sorted series
///
/// # Algorithm
/// - Q1, Q3 by the exclusive quartile method
/// - Flag values outside `[Q1 - 1.5 * IQR, Q3 + 1.5 * IQR]`
/// - Severity = min(|x - median| / σ, 3)
///
/// # Returns
/// Empty vec when the series is shorter than `min_points`, otherwise
/// anomalies in series order
pub fn detect_anomalies(series: &[SeriesPoint], min_points: usize) -> Vec<Anomaly> {
    if series.len() < min_points.max(2) {
        return vec![];
    }

    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let Some((q1, q3)) = quartiles(&values) else {
        return vec![];
    };
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;

    let med = median(&values);
    let std_dev = sample_std_dev(&values).unwrap_or(0.0);

    series
        .iter()
        .enumerate()
        .filter(|(_, p)| p.value < lower || p.value > upper)
        .map(|(index, p)| Anomaly {
            index,
            date: p.date.clone(),
            value: p.value,
            kind: if p.value > upper {
                AnomalyKind::OutlierHigh
            } else {
                AnomalyKind::OutlierLow
            },
            severity: if std_dev > 0.0 {
                ((p.value - med).abs() / std_dev).min(MAX_SEVERITY)
            } else {
                0.0
            },
        })
        .collect()
}
