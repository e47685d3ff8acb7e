//! Descriptive statistics over a metric series
//!
//! Spread figures use the sample (n - 1) estimator.

use serde::{Deserialize, Serialize};

/// Summary of one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    /// Only with more than one point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    /// std_dev / mean, 0 when the mean is 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coefficient_of_variation: Option<f64>,
}

impl SeriesStatistics {
    /// Returns `None` for an empty series
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mean = mean(values);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (std_dev, variance, cv) = match sample_variance(values) {
            Some(var) => {
                let sd = var.sqrt();
                let cv = if mean != 0.0 { sd / mean } else { 0.0 };
                (Some(sd), Some(var), Some(cv))
            }
            None => (None, None, None),
        };

        Some(Self {
            count: values.len(),
            mean,
            median: median(values),
            min,
            max,
            range: max - min,
            std_dev,
            variance,
            coefficient_of_variation: cv,
        })
    }
}

/// Period-over-period movement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    /// (last - first) / first, 0 when first is 0
    pub overall: f64,
    pub average: f64,
    /// Sample std-dev of `period_changes`, 0 with fewer than two
    pub volatility: f64,
    /// Relative change per step, skipping steps from a zero value
    pub period_changes: Vec<f64>,
}

impl ChangeAnalysis {
    pub fn compute(values: &[f64]) -> Self {
        if values.len() < 2 {
            return Self::default();
        }

        let first = values[0];
        let last = values[values.len() - 1];
        let overall = if first != 0.0 { (last - first) / first } else { 0.0 };

        let period_changes: Vec<f64> = values
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();

        let average = if period_changes.is_empty() {
            0.0
        } else {
            mean(&period_changes)
        };

        Self {
            overall,
            average,
            volatility: sample_std_dev(&period_changes).unwrap_or(0.0),
            period_changes,
        }
    }
}

/// Arithmetic mean (0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample variance, `None` with fewer than two values
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// First and third quartiles, "exclusive" interpolation
///
/// Positions are taken over `len + 1` and clamped to the data, so two
/// points is the minimum.
///
/// # Returns
/// `(q1, q3)`, or `None` with fewer than two values
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let data = sorted(values);
    let len = data.len() as i64;
    let m = len + 1;

    let cut = |i: i64| {
        let j = (i * m / 4).clamp(1, len - 1);
        let delta = (i * m - j * 4) as f64;
        let j = j as usize;
        (data[j - 1] * (4.0 - delta) + data[j] * delta) / 4.0
    };

    Some((cut(1), cut(3)))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_has_no_spread() {
        let stats = SeriesStatistics::compute(&[42.0]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.median, 42.0);
        assert_eq!(stats.range, 0.0);
        assert!(stats.std_dev.is_none());
        assert!(stats.coefficient_of_variation.is_none());
        assert!(SeriesStatistics::compute(&[]).is_none());
    }

    #[test]
    fn test_sample_estimators() {
        let stats = SeriesStatistics::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.median, 4.5);
        // 32 / 7
        assert!((stats.variance.unwrap() - 32.0 / 7.0).abs() < 1e-12);
        assert!((stats.coefficient_of_variation.unwrap() - stats.std_dev.unwrap() / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_mean_cv() {
        let stats = SeriesStatistics::compute(&[-1.0, 1.0]).unwrap();
        assert_eq!(stats.coefficient_of_variation, Some(0.0));
    }

    #[test]
    fn test_quartiles_exclusive() {
        let (q1, q3) = quartiles(&[10.0, 11.0, 9.0, 10.0, 12.0, 11.0, 100.0, 10.0, 9.0]).unwrap();
        assert_eq!(q1, 9.5);
        assert_eq!(q3, 11.5);

        let (q1, q3) = quartiles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(q1, 2.25);
        assert_eq!(q3, 6.75);
    }

    #[test]
    fn test_change_analysis_skips_zero_steps() {
        let changes = ChangeAnalysis::compute(&[0.0, 10.0, 20.0, 10.0]);
        assert_eq!(changes.overall, 0.0);
        assert_eq!(changes.period_changes, vec![1.0, -0.5]);
        assert_eq!(changes.average, 0.25);
        assert!(changes.volatility > 1.0);

        let flat = ChangeAnalysis::compute(&[5.0]);
        assert_eq!(flat, ChangeAnalysis::default());
    }
}
