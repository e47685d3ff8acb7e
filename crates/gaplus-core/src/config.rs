//! Runtime configuration for gaplus
//!
//! Every tuning constant (routing weights, TTLs, trend thresholds, adapter
//! endpoints) lives here with its default. Loaded from TOML; missing sections
//! and keys fall back to defaults. The CLI layers flag/env overrides on top.

use crate::error::{CoreError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub trend: TrendConfig,
    pub sources: SourcesConfig,
}

/// Source selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Allow the warehouse to be selected at all
    pub warehouse_enabled: bool,
    /// Serve every request from the mock adapter
    pub mock_mode: bool,
    /// Upper bound on a single adapter call
    pub source_timeout_secs: u64,
    pub weights: RoutingWeights,
    pub thresholds: RoutingThresholds,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            warehouse_enabled: true,
            mock_mode: false,
            source_timeout_secs: 30,
            weights: RoutingWeights::default(),
            thresholds: RoutingThresholds::default(),
        }
    }
}

/// Factor weights (sum to 1.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingWeights {
    pub data_volume: f64,
    pub query_complexity: f64,
    pub date_range: f64,
    pub performance: f64,
    pub availability: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            data_volume: 0.30,
            query_complexity: 0.25,
            date_range: 0.20,
            performance: 0.15,
            availability: 0.10,
        }
    }
}

impl RoutingWeights {
    pub fn total(&self) -> f64 {
        self.data_volume + self.query_complexity + self.date_range + self.performance + self.availability
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("data_volume", self.data_volume),
            ("query_complexity", self.query_complexity),
            ("date_range", self.date_range),
            ("performance", self.performance),
            ("availability", self.availability),
        ]
        .into_iter()
    }
}

/// Fixed factor scores and reasoning cut-offs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingThresholds {
    /// Factor score above which a "favors warehouse" reason is emitted
    pub strong_signal: f64,
    /// Factor score below which a "favors live API" reason is emitted
    pub weak_signal: f64,
    pub live_performance: f64,
    pub warehouse_performance: f64,
    pub live_availability: f64,
    pub warehouse_availability: f64,
    /// Dimension name fragments that mark a high-cardinality query
    pub high_cardinality_dimensions: Vec<String>,
    /// Range length (days) above which data volume gets the large step
    pub long_span_days: i64,
    /// Range length (days) above which data volume gets the small step
    pub medium_span_days: i64,
    pub many_dimensions: usize,
    pub several_dimensions: usize,
    pub many_metrics: usize,
    pub several_metrics: usize,
    /// Row limit above which data volume gets a step
    pub large_limit: u32,
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        Self {
            strong_signal: 0.7,
            weak_signal: 0.3,
            live_performance: 0.6,
            warehouse_performance: 0.4,
            live_availability: 0.5,
            warehouse_availability: 0.5,
            high_cardinality_dimensions: vec![
                "pageTitle".to_string(),
                "eventName".to_string(),
                "customDimension".to_string(),
            ],
            long_span_days: 90,
            medium_span_days: 30,
            many_dimensions: 2,
            several_dimensions: 1,
            many_metrics: 4,
            several_metrics: 2,
            large_limit: 100,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Networked store; in-process only when unset
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    /// TTL for queries whose window ends today
    pub live_ttl_secs: u64,
    /// Multiplier applied to the default TTL for expensive queries
    pub expensive_ttl_multiplier: u64,
    pub max_memory_entries: usize,
    /// How long the networked store is bypassed after a failure
    pub remote_retry_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "gaplus:".to_string(),
            default_ttl_secs: 300,
            live_ttl_secs: 60,
            expensive_ttl_multiplier: 2,
            max_memory_entries: 1000,
            remote_retry_secs: 30,
        }
    }
}

/// Which trend detector the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMethod {
    /// Least squares against the point index
    #[default]
    Regression,
    /// First third vs last third
    Thirds,
}

/// Trend engine thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub method: TrendMethod,
    pub volatility_threshold: f64,
    pub trend_threshold: f64,
    pub significance_level: f64,
    /// R² above which a regression trend is strong
    pub strong_r_squared: f64,
    /// R² above which a regression trend is moderate
    pub moderate_r_squared: f64,
    /// Relative change between thirds above which a trend is strong
    pub strong_change: f64,
    /// Relative change between thirds above which a trend is moderate
    pub moderate_change: f64,
    pub forecast_periods: usize,
    pub min_anomaly_points: usize,
    pub time_dimension: String,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            method: TrendMethod::Regression,
            volatility_threshold: 0.2,
            trend_threshold: 0.1,
            significance_level: 0.05,
            strong_r_squared: 0.7,
            moderate_r_squared: 0.3,
            strong_change: 0.3,
            moderate_change: 0.1,
            forecast_periods: 7,
            min_anomaly_points: 5,
            time_dimension: "date".to_string(),
        }
    }
}

/// Adapter endpoints and credentials
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub live_api: LiveApiConfig,
    pub warehouse: WarehouseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveApiConfig {
    pub base_url: String,
    /// Opaque bearer token; adapter reports unavailable without one
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LiveApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://analyticsdata.googleapis.com/v1beta".to_string(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub base_url: String,
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            project_id: None,
            dataset_id: None,
            access_token: None,
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/gaplus/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gaplus").join("config.toml"))
    }

    /// Parse a TOML file and validate it
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load from `path`, else the default location if present, else defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the router and cache cannot work with
    pub fn validate(&self) -> Result<()> {
        let weights = &self.routing.weights;
        if let Some((name, _)) = weights.iter().find(|(_, w)| *w < 0.0 || !w.is_finite()) {
            return Err(CoreError::config(format!(
                "routing weight '{}' must be a non-negative number",
                name
            )));
        }
        if (weights.total() - 1.0).abs() > 1e-6 {
            return Err(CoreError::config(format!(
                "routing weights must sum to 1.0 (got {:.3})",
                weights.total()
            )));
        }

        if self.cache.max_memory_entries == 0 {
            return Err(CoreError::config("cache.max_memory_entries must be at least 1"));
        }
        if self.cache.default_ttl_secs == 0 || self.cache.live_ttl_secs == 0 {
            return Err(CoreError::config("cache TTLs must be at least 1 second"));
        }
        if self.routing.source_timeout_secs == 0 {
            return Err(CoreError::config("routing.source_timeout_secs must be at least 1"));
        }
        if self.trend.forecast_periods == 0 {
            return Err(CoreError::config("trend.forecast_periods must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.trend.significance_level) {
            return Err(CoreError::config("trend.significance_level must be in [0, 1)"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.routing.weights.total() - 1.0).abs() < 1e-9);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.cache.live_ttl_secs, 60);
        assert_eq!(config.trend.method, TrendMethod::Regression);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[routing]
mock_mode = true

[trend]
method = "thirds"

[cache]
redis_url = "redis://127.0.0.1:6379/0"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.routing.mock_mode);
        assert!(config.routing.warehouse_enabled);
        assert_eq!(config.trend.method, TrendMethod::Thirds);
        assert_eq!(config.trend.volatility_threshold, 0.2);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://127.0.0.1:6379/0"));
        assert_eq!(config.cache.max_memory_entries, 1000);
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut config = Config::default();
        config.routing.weights.performance = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = Config::default();
        config.routing.weights.availability = -0.1;
        config.routing.weights.data_volume = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = Config::default();
        config.cache.max_memory_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::from_file(&dir.path().join("absent.toml"));
        assert!(result.is_err());
    }
}
