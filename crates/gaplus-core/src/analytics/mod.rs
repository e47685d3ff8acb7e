//! Trend analysis for metric time series
//!
//! Provides descriptive statistics, trend detection, period-over-period
//! change, outlier detection, a naive forecast and plain-language insights.
//! Everything here is synchronous and pure; callers run it inline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::TrendConfig;
use crate::error::{CoreError, Result};
use crate::models::Row;

pub mod anomalies;
pub mod extract;
pub mod forecasting;
pub mod insights;
pub mod statistics;
pub mod trends;


pub use anomalies::{Anomaly, AnomalyKind, detect_anomalies};
pub use extract::{SeriesPoint, series_from_json, series_from_rows};
pub use forecasting::{Forecast, ForecastOutcome, forecast};
pub use insights::generate_insights;
pub use statistics::{ChangeAnalysis, SeriesStatistics};
pub use trends::{
    RegressionDetector, ThirdsDetector, TrendDetector, TrendDirection, TrendSignal,
    TrendStrength, detector_for,
};

/// Fewest points a trend is computed from
pub const MIN_TREND_POINTS: usize = 3;

const NO_DATA: &str = "No data available for trend analysis";
const INSUFFICIENT_DATA: &str =
    "Insufficient data points for reliable trend analysis (minimum 3 required)";

/// Span covered by the analyzed series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: Option<String>,
    pub end: Option<String>,
    pub data_points: usize,
}

/// Complete analysis of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub metric_name: String,
    pub time_period: TimePeriod,
    pub trend: TrendSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<SeriesStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_analysis: Option<ChangeAnalysis>,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastOutcome>,
    #[serde(default)]
    pub insights: Vec<String>,
    /// Detector that produced `trend`
    #[serde(default)]
    pub method: String,
    /// Set when the series was empty or too short
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl TrendReport {
    /// Report carrying only an error and the flat STABLE/WEAK/0 trend
    fn failed(metric: &str, data_points: usize, message: &str) -> Self {
        Self {
            metric_name: metric.to_string(),
            time_period: TimePeriod {
                data_points,
                ..Default::default()
            },
            trend: TrendSignal::flat(),
            statistics: None,
            change_analysis: None,
            anomalies: Vec::new(),
            forecast: None,
            insights: Vec::new(),
            method: String::new(),
            error: Some(message.to_string()),
            analyzed_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Turn an error report into [`CoreError::TrendAnalysis`]
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(message) => Err(CoreError::TrendAnalysis {
                metric: self.metric_name,
                message,
            }),
            None => Ok(self),
        }
    }
}

/// Configured analyzer
pub struct TrendEngine {
    config: TrendConfig,
    detector: Box<dyn TrendDetector>,
}

impl TrendEngine {
    /// Engine using the detector named by `config.method`
    pub fn new(config: TrendConfig) -> Self {
        let detector = detector_for(&config);
        Self { config, detector }
    }

    pub fn with_detector(config: TrendConfig, detector: Box<dyn TrendDetector>) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Analyze typed rows keyed by the configured time dimension
    pub fn analyze(&self, rows: &[Row], metric: &str) -> TrendReport {
        self.analyze_with_time_dimension(rows, metric, &self.config.time_dimension)
    }

    pub fn analyze_with_time_dimension(
        &self,
        rows: &[Row],
        metric: &str,
        time_dimension: &str,
    ) -> TrendReport {
        if rows.is_empty() {
            return TrendReport::failed(metric, 0, NO_DATA);
        }
        self.analyze_series(metric, series_from_rows(rows, metric, time_dimension))
    }

    /// Analyze JSON rows in flat or columnar shape
    pub fn analyze_json(&self, rows: &[Value], metric: &str) -> TrendReport {
        if rows.is_empty() {
            return TrendReport::failed(metric, 0, NO_DATA);
        }
        self.analyze_series(
            metric,
            series_from_json(rows, metric, &self.config.time_dimension),
        )
    }

    /// Analyze an extracted series (sorted by date)
    ///
    /// # Performance
    /// Linear in the number of points apart from the quartile sort.
    pub fn analyze_series(&self, metric: &str, series: Vec<SeriesPoint>) -> TrendReport {
        if series.len() < MIN_TREND_POINTS {
            return TrendReport::failed(metric, series.len(), INSUFFICIENT_DATA);
        }

        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        let statistics = SeriesStatistics::compute(&values);

        let mut trend = self.detector.detect(&values);
        let cv = statistics
            .as_ref()
            .and_then(|s| s.coefficient_of_variation)
            .unwrap_or(0.0);
        if cv > self.config.volatility_threshold && trend.direction == TrendDirection::Stable {
            trend.direction = TrendDirection::Volatile;
        }

        let changes = ChangeAnalysis::compute(&values);
        let anomalies = detect_anomalies(&series, self.config.min_anomaly_points);
        let forecast = forecast(&values, self.config.forecast_periods);
        let insights =
            generate_insights(series.len(), trend.direction, trend.strength, &changes, &anomalies);

        debug!(
            metric,
            points = series.len(),
            direction = %trend.direction,
            strength = %trend.strength,
            anomalies = anomalies.len(),
            "Trend analyzed"
        );

        TrendReport {
            metric_name: metric.to_string(),
            time_period: TimePeriod {
                start: series.first().map(|p| p.date.clone()),
                end: series.last().map(|p| p.date.clone()),
                data_points: series.len(),
            },
            trend,
            statistics,
            change_analysis: Some(changes),
            anomalies,
            forecast: Some(forecast),
            insights,
            method: self.detector.name().to_string(),
            error: None,
            analyzed_at: Utc::now(),
        }
    }
}

impl Default for TrendEngine {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}
