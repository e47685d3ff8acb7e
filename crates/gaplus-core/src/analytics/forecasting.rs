//! Short-horizon forecast by naive trend extrapolation
//!
//! Deliberately simple: a recent-window average projected along the
//! half-over-half slope. Always reported with `low` confidence.

use super::statistics::mean;
use serde::{Deserialize, Serialize};

pub const FORECAST_METHOD: &str = "simple_trend_extrapolation";

/// Most recent points averaged into the base value
const MAX_WINDOW: usize = 7;

/// Projection details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub method: String,
    pub periods: usize,
    /// Never negative
    pub forecasted_values: Vec<f64>,
    pub confidence: String,
    pub base_value: f64,
    pub trend_slope: f64,
}

/// Projection, or why there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForecastOutcome {
    Projection(Forecast),
    Unavailable { error: String },
}

impl ForecastOutcome {
    pub fn projection(&self) -> Option<&Forecast> {
        match self {
            Self::Projection(f) => Some(f),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Forecast `periods` steps past the end of `values`
///
/// # Algorithm
/// - base = mean of the last min(7, n / 2) values
/// - slope = (mean of second half - mean of first half) / (n / 2)
/// - value_i = max(0, base + slope * i) for i in 1..=periods
///
/// # Returns
/// `Unavailable` with fewer than 3 values
pub fn forecast(values: &[f64], periods: usize) -> ForecastOutcome {
    let n = values.len();
    if n < 3 {
        return ForecastOutcome::Unavailable {
            error: "Insufficient data for forecasting".to_string(),
        };
    }

    let half = n / 2;
    let window = MAX_WINDOW.min(half);
    let base_value = mean(&values[n - window..]);
    let trend_slope = (mean(&values[half..]) - mean(&values[..half])) / half as f64;

    let forecasted_values = (1..=periods)
        .map(|i| (base_value + trend_slope * i as f64).max(0.0))
        .collect();

    ForecastOutcome::Projection(Forecast {
        method: FORECAST_METHOD.to_string(),
        periods,
        forecasted_values,
        confidence: "low".to_string(),
        base_value,
        trend_slope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_series_projection() {
        // half = 3, window = 3: base = mean(130, 140, 150) = 140
        // slope = (140 - 110) / 3 = 10
        let outcome = forecast(&[100.0, 110.0, 120.0, 130.0, 140.0, 150.0], 3);
        let f = outcome.projection().unwrap();

        assert_eq!(f.method, FORECAST_METHOD);
        assert_eq!(f.base_value, 140.0);
        assert_eq!(f.trend_slope, 10.0);
        assert_eq!(f.forecasted_values, vec![150.0, 160.0, 170.0]);
    }

    #[test]
    fn test_never_negative() {
        let outcome = forecast(&[30.0, 20.0, 10.0, 0.0], 5);
        let f = outcome.projection().unwrap();
        assert!(f.forecasted_values.iter().all(|v| *v >= 0.0));
        assert_eq!(*f.forecasted_values.last().unwrap(), 0.0);
    }

    #[test]
    fn test_too_short() {
        let outcome = forecast(&[1.0, 2.0], 7);
        assert!(outcome.projection().is_none());
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["error"].is_string());
    }
}
