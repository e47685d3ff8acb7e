//! Request lifecycle: cache, route, run, fall back, analyze, cache
//!
//! [`Orchestrator::execute`] always returns a [`NormalizedResult`]. Caller-facing
//! failures (invalid descriptor, every source failed) come back as error
//! results. Cache and trend problems are logged and otherwise ignored.

use crate::analytics::{TrendEngine, MIN_TREND_POINTS};
use crate::cache::{query_key, CacheHealth, CacheStats, QueryCache};
use crate::config::{Config, RoutingWeights};
use crate::error::{CoreError, SourceError};
use crate::models::{DataSource, NormalizedResult, QueryDescriptor};
use crate::routing::{RoutingContext, RoutingDecision, SourceSelector};
use crate::sources::{SourceSet, SourceStats};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Dimensions that make a result a time series
pub const TIME_DIMENSIONS: &[&str] = &[
    "date",
    "dateHour",
    "dateHourMinute",
    "hour",
    "week",
    "isoWeek",
    "yearWeek",
    "month",
    "yearMonth",
];

/// Routing diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub sources_available: BTreeMap<DataSource, bool>,
    pub routing_enabled: bool,
    pub weights: RoutingWeights,
    pub mock_mode: bool,
}

/// Central entry point
///
/// Owns the cache, the selector, the three adapters and the trend engine.
/// Steps of one request run strictly in sequence; distinct requests may run
/// concurrently on a shared `Orchestrator`.
pub struct Orchestrator {
    config: Config,
    cache: QueryCache,
    selector: SourceSelector,
    sources: SourceSet,
    trends: TrendEngine,
    /// Fixed "today" (tests); None means the local date
    today: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(config: Config, cache: QueryCache, sources: SourceSet) -> Self {
        Self {
            selector: SourceSelector::new(config.routing.clone()),
            trends: TrendEngine::new(config.trend.clone()),
            config,
            cache,
            sources,
            today: None,
        }
    }

    /// HTTP adapters and the configured cache backends
    pub fn from_config(config: Config) -> Self {
        let cache = QueryCache::from_config(&config.cache);
        let sources = SourceSet::from_config(&config);
        Self::new(config, cache, sources)
    }

    pub fn with_trend_engine(mut self, trends: TrendEngine) -> Self {
        self.trends = trends;
        self
    }

    /// Pin the date relative ranges resolve against
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn routing_context(&self) -> RoutingContext {
        RoutingContext {
            today: self.today(),
            warehouse_available: self.sources.is_available(DataSource::Warehouse),
        }
    }

    /// Routing decision for a descriptor without running it
    pub fn route(&self, descriptor: &QueryDescriptor) -> RoutingDecision {
        self.selector.select(descriptor, &self.routing_context())
    }

    /// Run one request end to end
    ///
    /// # Returns
    /// - A cached result when one is live for this descriptor and target
    /// - Rows from the selected source, or from its alternate after a failure
    /// - An error result (`validation` or `all_sources_failed`) otherwise
    pub async fn execute(&self, descriptor: &QueryDescriptor, target_id: &str) -> NormalizedResult {
        let today = self.today();
        if let Err(e) = descriptor.validate_at(today) {
            warn!(target_id, error = %e, "Rejected query descriptor");
            return NormalizedResult::from_core_error(&e);
        }

        let key = query_key(descriptor, target_id);
        if let Some(cached) = self.cache.get_json::<NormalizedResult>(&key).await {
            info!(target_id, cached_at = %cached.cached_at, "Query served from cache");
            return cached.value;
        }

        let decision = self.selector.select(descriptor, &self.routing_context());
        let primary = decision.selected_source;
        let query_type = descriptor.query_type();
        info!(
            source = %primary,
            scored = decision.scored,
            query_type = %query_type,
            reasoning = %decision.summary(),
            "Data source selected"
        );

        let timeout = Duration::from_secs(self.config.routing.source_timeout_secs);
        let mut reasoning = decision.reasoning;

        let mut result = match self.sources.run(primary, descriptor, target_id, timeout).await {
            Ok(result) => result,
            Err(primary_err) => {
                match self.run_fallback(primary, descriptor, target_id, timeout).await {
                    Ok(mut result) => {
                        info!(from = %primary, to = ?result.metadata.source, "Served by fallback source");
                        reasoning.push(format!("fallback from {} ({})", primary, primary_err.kind));
                        result.metadata.fallback_from = Some(primary);
                        result
                    }
                    Err(fallback_err) => {
                        let err = CoreError::AllSourcesFailed {
                            primary: primary_err,
                            fallback: fallback_err,
                        };
                        error!(target_id, error = %err, "Query failed on every source");
                        let mut result = NormalizedResult::from_core_error(&err);
                        result.metadata.target_id = Some(target_id.to_string());
                        result.metadata.routing_reasoning = reasoning;
                        result.metadata.query_type = Some(query_type);
                        return result;
                    }
                }
            }
        };

        result.metadata.routing_reasoning = reasoning;
        result.metadata.query_type = Some(query_type);

        self.attach_trend(descriptor, &mut result);

        let ttl = self.cache_ttl(descriptor);
        if self.cache.set_json(&key, &result, ttl).await {
            debug!(ttl_secs = ttl.as_secs(), rows = result.row_count, "Result cached");
        }

        result
    }

    /// The single alternate attempt after `primary` failed
    ///
    /// `Err(None)` when `primary` has no alternate (mock).
    async fn run_fallback(
        &self,
        primary: DataSource,
        descriptor: &QueryDescriptor,
        target_id: &str,
        timeout: Duration,
    ) -> Result<NormalizedResult, Option<SourceError>> {
        let Some(alternate) = primary.alternate() else {
            return Err(None);
        };

        if alternate == DataSource::Warehouse
            && !(self.config.routing.warehouse_enabled && self.sources.is_available(alternate))
        {
            return Err(Some(SourceError::unavailable(
                alternate,
                "warehouse routing disabled or not configured",
            )));
        }

        debug!(from = %primary, to = %alternate, "Trying fallback source");
        self.sources
            .run(alternate, descriptor, target_id, timeout)
            .await
            .map_err(Some)
    }

    /// Trend analysis on the first metric when the result is a time series
    fn attach_trend(&self, descriptor: &QueryDescriptor, result: &mut NormalizedResult) {
        let Some(time_dimension) = descriptor
            .dimension_names()
            .find(|d| TIME_DIMENSIONS.contains(d))
        else {
            return;
        };
        if result.row_count < MIN_TREND_POINTS {
            return;
        }
        let Some(metric) = descriptor.first_metric() else {
            return;
        };

        match self
            .trends
            .analyze_with_time_dimension(&result.rows, metric, time_dimension)
            .into_result()
        {
            Ok(report) => {
                debug!(metric, direction = %report.trend.direction, "Trend analysis attached");
                result.trend_analysis = Some(report);
            }
            Err(e) => warn!(error = %e, "Trend analysis skipped"),
        }
    }

    /// TTL for a successful result
    ///
    /// Ranges ending today get the live TTL, and that check comes first.
    /// Otherwise more than 3 metrics or more than 2 dimensions get the
    /// default TTL times the multiplier, and anything else gets the default.
    pub fn cache_ttl(&self, descriptor: &QueryDescriptor) -> Duration {
        let c = &self.config.cache;
        let secs = if descriptor.ends_today() {
            c.live_ttl_secs
        } else if descriptor.metrics.len() > 3 || descriptor.dimensions.len() > 2 {
            c.default_ttl_secs * c.expensive_ttl_multiplier
        } else {
            c.default_ttl_secs
        };
        Duration::from_secs(secs)
    }

    pub fn get_routing_stats(&self) -> RoutingStats {
        RoutingStats {
            sources_available: DataSource::ALL
                .iter()
                .map(|&s| (s, self.sources.is_available(s)))
                .collect(),
            routing_enabled: self.config.routing.warehouse_enabled,
            weights: self.selector.weights().clone(),
            mock_mode: self.config.routing.mock_mode,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn cache_health(&self) -> CacheHealth {
        self.cache.health_check().await
    }

    /// Drop cached entries whose key (without store prefix) matches `pattern`
    pub async fn clear_cache(&self, pattern: &str) -> usize {
        self.cache.clear_pattern(pattern).await
    }

    pub fn source_stats(&self) -> Vec<SourceStats> {
        self.sources.stats()
    }
}
