//! End-to-end orchestrator tests with scripted adapters

use async_trait::async_trait;
use chrono::NaiveDate;
use gaplus_core::error::{ErrorKind, SourceError, SourceErrorKind};
use gaplus_core::models::{
    DataSource, DateRange, DateSpec, NormalizedResult, QueryDescriptor, ResultMetadata, Row,
    Scalar,
};
use gaplus_core::sources::{MockAdapter, SourceAdapter, SourceSet};
use gaplus_core::cache::query_key;
use gaplus_core::{Config, Orchestrator, QueryCache};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Adapter that counts calls and either returns dated rows or fails
struct ScriptedAdapter {
    source: DataSource,
    available: bool,
    failure: Option<SourceErrorKind>,
    delay: Option<Duration>,
    rows: usize,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn ok(source: DataSource, rows: usize) -> Arc<Self> {
        Arc::new(Self {
            source,
            available: true,
            failure: None,
            delay: None,
            rows,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(source: DataSource, kind: SourceErrorKind) -> Arc<Self> {
        Arc::new(Self {
            source,
            available: true,
            failure: Some(kind),
            delay: None,
            rows: 0,
            calls: AtomicUsize::new(0),
        })
    }

    fn unavailable(source: DataSource) -> Arc<Self> {
        Arc::new(Self {
            source,
            available: false,
            failure: Some(SourceErrorKind::Unavailable),
            delay: None,
            rows: 0,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(source: DataSource, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            available: true,
            failure: None,
            delay: Some(delay),
            rows: 3,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source(&self) -> DataSource {
        self.source
    }

    async fn run(
        &self,
        descriptor: &QueryDescriptor,
        target_id: &str,
    ) -> Result<NormalizedResult, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.failure {
            return Err(SourceError::new(self.source, kind, "scripted failure"));
        }

        let metric = descriptor.first_metric().unwrap_or("sessions").to_string();
        let rows: Vec<Row> = (0..self.rows)
            .map(|i| {
                let mut row = BTreeMap::new();
                row.insert("date".to_string(), Scalar::Text(format!("202406{:02}", i + 1)));
                row.insert(metric.clone(), Scalar::Int(100 + 10 * i as i64));
                row
            })
            .collect();
        Ok(NormalizedResult::new(rows, Vec::new(), ResultMetadata::new(self.source, target_id)))
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

fn build(config: Config, live: Arc<ScriptedAdapter>, warehouse: Arc<ScriptedAdapter>) -> Orchestrator {
    let cache = QueryCache::new(&config.cache);
    let sources = SourceSet::new(live, warehouse, Arc::new(MockAdapter::new()));
    Orchestrator::new(config, cache, sources).with_today(today())
}

/// Long, wide, filtered comparison query that scores towards the warehouse
fn heavy_query() -> QueryDescriptor {
    let mut filters = BTreeMap::new();
    filters.insert("country".to_string(), serde_json::json!("Taiwan"));
    QueryDescriptor::new(["sessions", "totalUsers", "screenPageViews", "conversions", "engagedSessions"])
        .with_dimensions(["date", "pageTitle", "country"])
        .with_date_ranges(vec![
            DateRange::new(DateSpec::DaysAgo(400), DateSpec::Yesterday),
            DateRange::new(DateSpec::DaysAgo(800), DateSpec::DaysAgo(401)),
        ])
        .with_filters(filters)
        .with_limit(1000)
}

#[tokio::test]
async fn test_live_only_today_query() {
    let mut config = Config::default();
    config.routing.warehouse_enabled = false;
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 1);
    let warehouse = ScriptedAdapter::ok(DataSource::Warehouse, 1);
    let orch = build(config, live.clone(), warehouse.clone());

    let q = QueryDescriptor::new(["totalUsers"])
        .with_date_ranges(vec![DateRange::new(DateSpec::Today, DateSpec::Today)]);

    let decision = orch.route(&q);
    assert_eq!(decision.selected_source, DataSource::LiveApi);
    assert!(!decision.scored, "Disabled routing must not score");
    assert!(decision.score_breakdown.is_empty());

    let result = orch.execute(&q, "123").await;
    assert!(!result.is_error());
    assert_eq!(result.metadata.source, Some(DataSource::LiveApi));
    assert_eq!(warehouse.calls(), 0);

    let stored = orch
        .cache()
        .get_json::<NormalizedResult>(&query_key(&q, "123"))
        .await
        .expect("result stored");
    assert_eq!(stored.ttl_secs, 60, "Today-only results get the short TTL");
    assert_eq!(stored.value.row_count, 1);
}

#[tokio::test]
async fn test_second_call_served_from_cache() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::unavailable(DataSource::Warehouse);
    let orch = build(Config::default(), live.clone(), warehouse);

    let q = QueryDescriptor::new(["sessions"]).with_dimensions(["date"]);
    let first = orch.execute(&q, "123").await;
    let second = orch.execute(&q, "123").await;

    assert_eq!(live.calls(), 1, "Cache hit must not touch sources");
    assert_eq!(first.rows, second.rows);
    assert_eq!(orch.cache_stats().hits, 1);

    // A different target is a different key
    orch.execute(&q, "456").await;
    assert_eq!(live.calls(), 2);
}

#[tokio::test]
async fn test_warehouse_failure_falls_back_once() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::failing(DataSource::Warehouse, SourceErrorKind::QuotaExceeded);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let result = orch.execute(&heavy_query(), "123").await;

    assert!(!result.is_error());
    assert_eq!(warehouse.calls(), 1, "Primary is never retried");
    assert_eq!(live.calls(), 1, "Alternate is tried exactly once");
    assert_eq!(result.metadata.source, Some(DataSource::LiveApi));
    assert_eq!(result.metadata.fallback_from, Some(DataSource::Warehouse));
    assert!(result
        .metadata
        .routing_reasoning
        .last()
        .unwrap()
        .contains("fallback from warehouse"));
}

#[tokio::test]
async fn test_live_unavailable_falls_back_to_warehouse() {
    let live = ScriptedAdapter::failing(DataSource::LiveApi, SourceErrorKind::Unavailable);
    let warehouse = ScriptedAdapter::ok(DataSource::Warehouse, 3);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let q = QueryDescriptor::new(["sessions"]).with_date_ranges(vec![DateRange::last_days(7)]);
    assert_eq!(orch.route(&q).selected_source, DataSource::LiveApi);

    let result = orch.execute(&q, "123").await;

    assert!(!result.is_error());
    assert_eq!(live.calls(), 1, "Primary is never retried");
    assert_eq!(warehouse.calls(), 1, "Alternate is tried exactly once");
    assert_eq!(result.row_count, 3);
    assert_eq!(result.metadata.source, Some(DataSource::Warehouse));
    assert_eq!(result.metadata.fallback_from, Some(DataSource::LiveApi));
    assert!(result
        .metadata
        .routing_reasoning
        .last()
        .unwrap()
        .contains("fallback from live_api (unavailable)"));
}

#[tokio::test]
async fn test_both_sources_fail() {
    let live = ScriptedAdapter::failing(DataSource::LiveApi, SourceErrorKind::PermissionDenied);
    let warehouse = ScriptedAdapter::failing(DataSource::Warehouse, SourceErrorKind::InvalidArgument);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let result = orch.execute(&heavy_query(), "123").await;

    let error = result.error.as_ref().expect("error result");
    assert_eq!(error.kind, ErrorKind::AllSourcesFailed);
    assert!(error.message.contains("invalid_argument"), "{}", error.message);
    assert!(error.message.contains("permission_denied"), "{}", error.message);
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, 0);
    assert_eq!(warehouse.calls(), 1);
    assert_eq!(live.calls(), 1);

    // Failures are not cached
    orch.execute(&heavy_query(), "123").await;
    assert_eq!(warehouse.calls(), 2);
}

#[tokio::test]
async fn test_live_failure_with_warehouse_down() {
    let live = ScriptedAdapter::failing(DataSource::LiveApi, SourceErrorKind::Unavailable);
    let warehouse = ScriptedAdapter::unavailable(DataSource::Warehouse);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let result = orch.execute(&QueryDescriptor::new(["sessions"]), "123").await;

    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::AllSourcesFailed);
    assert_eq!(warehouse.calls(), 0, "Unavailable warehouse is not called");
    assert_eq!(live.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_triggers_fallback() {
    let mut config = Config::default();
    config.routing.source_timeout_secs = 5;
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::slow(DataSource::Warehouse, Duration::from_secs(60));
    let orch = build(config, live.clone(), warehouse.clone());

    let result = orch.execute(&heavy_query(), "123").await;

    assert!(!result.is_error());
    assert_eq!(result.metadata.fallback_from, Some(DataSource::Warehouse));
    assert!(result
        .metadata
        .routing_reasoning
        .last()
        .unwrap()
        .contains("timeout"));
    let wh_stats = orch
        .source_stats()
        .into_iter()
        .find(|s| s.source == DataSource::Warehouse)
        .unwrap();
    assert_eq!(wh_stats.errors, 1);
}

#[tokio::test]
async fn test_invalid_descriptor_touches_nothing() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::ok(DataSource::Warehouse, 3);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let q = QueryDescriptor::new(["bad metric!"]);
    let result = orch.execute(&q, "123").await;

    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::Validation);
    assert_eq!(live.calls() + warehouse.calls(), 0);
    let stats = orch.cache_stats();
    assert_eq!(stats.hits + stats.misses, 0, "Cache untouched");
}

#[tokio::test]
async fn test_huge_lookback_is_a_validation_error() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::ok(DataSource::Warehouse, 3);
    let orch = build(Config::default(), live.clone(), warehouse.clone());

    let q: QueryDescriptor = serde_json::from_str(
        r#"{"metrics":[{"name":"sessions"}],
            "date_ranges":[{"start_date":"4000000000daysAgo","end_date":"today"}]}"#,
    )
    .unwrap();
    let result = orch.execute(&q, "123").await;

    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::Validation);
    assert_eq!(live.calls() + warehouse.calls(), 0);
}

#[tokio::test]
async fn test_trend_attached_for_time_series() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 7);
    let warehouse = ScriptedAdapter::unavailable(DataSource::Warehouse);
    let orch = build(Config::default(), live, warehouse);

    let series = QueryDescriptor::new(["sessions", "totalUsers"]).with_dimensions(["date"]);
    let result = orch.execute(&series, "123").await;
    let report = result.trend_analysis.expect("trend attached");
    assert_eq!(report.metric_name, "sessions");
    assert_eq!(report.time_period.data_points, 7);

    let by_country = QueryDescriptor::new(["sessions"]).with_dimensions(["country"]);
    let result = orch.execute(&by_country, "123").await;
    assert!(result.trend_analysis.is_none(), "No time dimension, no trend");
}

#[tokio::test]
async fn test_short_series_skips_trend() {
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 2);
    let warehouse = ScriptedAdapter::unavailable(DataSource::Warehouse);
    let orch = build(Config::default(), live, warehouse);

    let q = QueryDescriptor::new(["sessions"]).with_dimensions(["date"]);
    let result = orch.execute(&q, "123").await;
    assert_eq!(result.row_count, 2);
    assert!(result.trend_analysis.is_none());
}

#[tokio::test]
async fn test_mock_mode_serves_mock_rows() {
    let mut config = Config::default();
    config.routing.mock_mode = true;
    let live = ScriptedAdapter::ok(DataSource::LiveApi, 3);
    let warehouse = ScriptedAdapter::ok(DataSource::Warehouse, 3);
    let orch = build(config, live.clone(), warehouse.clone());

    let q = QueryDescriptor::new(["sessions"]).with_dimensions(["date"]);
    let result = orch.execute(&q, "demo").await;

    assert_eq!(result.metadata.source, Some(DataSource::Mock));
    assert!(result.metadata.is_mock);
    assert_eq!(result.metadata.routing_reasoning, vec!["mock mode enabled"]);
    assert_eq!(live.calls() + warehouse.calls(), 0);
    assert!(result.trend_analysis.is_some());

    let stats = orch.get_routing_stats();
    assert!(stats.mock_mode);
    assert!(stats.sources_available[&DataSource::Mock]);
}
