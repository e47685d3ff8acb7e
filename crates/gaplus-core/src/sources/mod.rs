//! Source adapters
//!
//! Every backing source sits behind [`SourceAdapter`]. The orchestrator never
//! holds adapters directly: it goes through a [`SourceSet`] with exactly one
//! slot per [`DataSource`], which bounds each call by a timeout and keeps
//! per-source counters.

pub mod live_api;
pub mod mock;
pub mod warehouse;

pub use live_api::LiveApiAdapter;
pub use mock::MockAdapter;
pub use warehouse::WarehouseAdapter;

use crate::config::{Config, SourcesConfig};
use crate::error::SourceError;
use crate::models::{DataSource, NormalizedResult, QueryDescriptor, Row, Scalar};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One backing data source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which slot this adapter fills
    fn source(&self) -> DataSource;

    /// Execute a descriptor against `target_id` (property / stream id)
    ///
    /// Implementations do not retry; the orchestrator decides what happens next.
    async fn run(
        &self,
        descriptor: &QueryDescriptor,
        target_id: &str,
    ) -> Result<NormalizedResult, SourceError>;

    /// Cheap, synchronous readiness check (credentials present, enabled)
    fn is_available(&self) -> bool;
}

#[derive(Debug, Default)]
struct AdapterCounters {
    queries: AtomicU64,
    errors: AtomicU64,
    rows: AtomicU64,
    total_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Per-source activity snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: DataSource,
    pub available: bool,
    pub queries: u64,
    pub errors: u64,
    pub rows: u64,
    pub avg_latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The three adapters, addressed by [`DataSource`]
pub struct SourceSet {
    live_api: Arc<dyn SourceAdapter>,
    warehouse: Arc<dyn SourceAdapter>,
    mock: Arc<dyn SourceAdapter>,
    counters: [AdapterCounters; 3],
}

impl SourceSet {
    pub fn new(
        live_api: Arc<dyn SourceAdapter>,
        warehouse: Arc<dyn SourceAdapter>,
        mock: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            live_api,
            warehouse,
            mock,
            counters: Default::default(),
        }
    }

    /// HTTP-backed adapters built from config
    ///
    /// In mock mode the live slot serves mock rows, so requests routed to the
    /// live API still succeed offline.
    pub fn from_config(config: &Config) -> Self {
        let SourcesConfig {
            live_api,
            warehouse,
        } = &config.sources;
        let live: Arc<dyn SourceAdapter> = if config.routing.mock_mode {
            Arc::new(MockAdapter::standing_in_for(DataSource::LiveApi))
        } else {
            Arc::new(LiveApiAdapter::new(live_api.clone()))
        };
        Self::new(
            live,
            Arc::new(WarehouseAdapter::new(
                warehouse.clone(),
                config.routing.warehouse_enabled,
            )),
            Arc::new(MockAdapter::new()),
        )
    }

    pub fn adapter(&self, source: DataSource) -> &Arc<dyn SourceAdapter> {
        match source {
            DataSource::LiveApi => &self.live_api,
            DataSource::Warehouse => &self.warehouse,
            DataSource::Mock => &self.mock,
        }
    }

    fn counters(&self, source: DataSource) -> &AdapterCounters {
        match source {
            DataSource::LiveApi => &self.counters[0],
            DataSource::Warehouse => &self.counters[1],
            DataSource::Mock => &self.counters[2],
        }
    }

    pub fn is_available(&self, source: DataSource) -> bool {
        self.adapter(source).is_available()
    }

    /// Run one adapter once, bounded by `timeout`
    ///
    /// A call that outlives the timeout is dropped and reported as
    /// [`SourceErrorKind::Timeout`](crate::error::SourceErrorKind::Timeout).
    pub async fn run(
        &self,
        source: DataSource,
        descriptor: &QueryDescriptor,
        target_id: &str,
        timeout: Duration,
    ) -> Result<NormalizedResult, SourceError> {
        let counters = self.counters(source);
        counters.queries.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let outcome = match tokio::time::timeout(timeout, self.adapter(source).run(descriptor, target_id)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::timeout(source, timeout.as_secs())),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        counters.total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);

        match &outcome {
            Ok(result) => {
                counters.rows.fetch_add(result.row_count as u64, Ordering::Relaxed);
                debug!(%source, rows = result.row_count, elapsed_ms, "Source call succeeded");
            }
            Err(e) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                *counters.last_error.lock() = Some(e.to_string());
                warn!(%source, kind = %e.kind, error = %e.message, elapsed_ms, "Source call failed");
            }
        }

        outcome
    }

    pub fn stats(&self) -> Vec<SourceStats> {
        DataSource::ALL
            .iter()
            .map(|&source| {
                let c = self.counters(source);
                let queries = c.queries.load(Ordering::Relaxed);
                SourceStats {
                    source,
                    available: self.is_available(source),
                    queries,
                    errors: c.errors.load(Ordering::Relaxed),
                    rows: c.rows.load(Ordering::Relaxed),
                    avg_latency_ms: if queries == 0 {
                        0.0
                    } else {
                        c.total_ms.load(Ordering::Relaxed) as f64 / queries as f64
                    },
                    last_error: c.last_error.lock().clone(),
                }
            })
            .collect()
    }
}

/// Sum numeric metric columns into a single totals row
pub(crate) fn sum_totals<'a>(rows: &[Row], metrics: impl Iterator<Item = &'a str>) -> Vec<Row> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut totals = Row::new();
    for metric in metrics {
        let mut int_sum: i64 = 0;
        let mut float_sum: f64 = 0.0;
        let mut any_float = false;

        for value in rows.iter().filter_map(|r| r.get(metric)) {
            match value {
                Scalar::Int(v) => {
                    int_sum = int_sum.saturating_add(*v);
                    float_sum += *v as f64;
                }
                Scalar::Float(v) => {
                    any_float = true;
                    float_sum += v;
                }
                Scalar::Text(_) => {}
            }
        }

        let total = if any_float {
            Scalar::Float(float_sum)
        } else {
            Scalar::Int(int_sum)
        };
        totals.insert(metric.to_string(), total);
    }
    vec![totals]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;

    struct SlowAdapter;

    #[async_trait]
    impl SourceAdapter for SlowAdapter {
        fn source(&self) -> DataSource {
            DataSource::LiveApi
        }

        async fn run(
            &self,
            _descriptor: &QueryDescriptor,
            _target_id: &str,
        ) -> Result<NormalizedResult, SourceError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Err(SourceError::unavailable(DataSource::LiveApi, "unreachable"))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn set_with_live(live: Arc<dyn SourceAdapter>) -> SourceSet {
        SourceSet::new(live, Arc::new(MockAdapter::new()), Arc::new(MockAdapter::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let sources = set_with_live(Arc::new(SlowAdapter));
        let err = sources
            .run(
                DataSource::LiveApi,
                &QueryDescriptor::new(["sessions"]),
                "123",
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, SourceErrorKind::Timeout);
        assert_eq!(err.source_name, DataSource::LiveApi);

        let stats = sources.stats();
        assert_eq!(stats[0].queries, 1);
        assert_eq!(stats[0].errors, 1);
        assert!(stats[0].last_error.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn test_mock_mode_fills_live_slot() {
        let mut config = Config::default();
        assert!(!SourceSet::from_config(&config).is_available(DataSource::LiveApi));

        config.routing.mock_mode = true;
        let sources = SourceSet::from_config(&config);
        assert!(sources.is_available(DataSource::LiveApi));
        assert_eq!(sources.adapter(DataSource::LiveApi).source(), DataSource::LiveApi);
    }

    #[tokio::test]
    async fn test_stats_count_rows() {
        let sources = set_with_live(Arc::new(MockAdapter::new()));
        let q = QueryDescriptor::new(["sessions"]).with_dimensions(["date"]).with_limit(5);
        let result = sources
            .run(DataSource::Mock, &q, "demo", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.row_count, 5);
        let mock = sources
            .stats()
            .into_iter()
            .find(|s| s.source == DataSource::Mock)
            .unwrap();
        assert_eq!(mock.queries, 1);
        assert_eq!(mock.rows, 5);
        assert_eq!(mock.errors, 0);
    }
}
