//! Performance benchmarks for trend analysis and routing
//!
//! Targets:
//! - TrendEngine::analyze(365 points) → <1ms
//! - SourceSelector::select → <10µs
//! - Orchestrator::execute (mock, cache warm) → <50µs

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gaplus_core::analytics::TrendEngine;
use gaplus_core::cache::query_key;
use gaplus_core::config::{TrendConfig, TrendMethod};
use gaplus_core::models::{DateRange, DateSpec, QueryDescriptor, Row, Scalar};
use gaplus_core::routing::{RoutingContext, SourceSelector};
use gaplus_core::{Config, Orchestrator};

/// Daily rows with a gentle upward drift and a weekly wobble
fn generate_rows(days: usize) -> Vec<Row> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    (0..days)
        .map(|i| {
            let mut row = Row::new();
            let date = start + chrono::Duration::days(i as i64);
            row.insert("date".to_string(), Scalar::Text(date.format("%Y%m%d").to_string()));
            let value = 1000.0 + i as f64 * 2.5 + ((i % 7) as f64 - 3.0) * 40.0;
            row.insert("sessions".to_string(), Scalar::Float(value));
            row
        })
        .collect()
}

/// Benchmark 1: full analysis with each detector
fn analyze_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("trend_analyze");

    for method in [TrendMethod::Regression, TrendMethod::Thirds] {
        let engine = TrendEngine::new(TrendConfig {
            method,
            ..Default::default()
        });
        for days in [30, 90, 365] {
            let rows = generate_rows(days);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", method), days),
                &rows,
                |b, rows| {
                    b.iter(|| {
                        black_box(engine.analyze(rows, "sessions"));
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark 2: routing decision and cache key
fn routing_benchmark(c: &mut Criterion) {
    let selector = SourceSelector::new(Default::default());
    let ctx = RoutingContext {
        today: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        warehouse_available: true,
    };
    let descriptor = QueryDescriptor::new(["sessions", "totalUsers", "conversions"])
        .with_dimensions(["date", "pageTitle"])
        .with_date_ranges(vec![DateRange::new(DateSpec::DaysAgo(120), DateSpec::Yesterday)]);

    c.bench_function("select_source", |b| {
        b.iter(|| {
            black_box(selector.select(&descriptor, &ctx));
        });
    });

    c.bench_function("query_key", |b| {
        b.iter(|| {
            black_box(query_key(&descriptor, "123456"));
        });
    });
}

/// Benchmark 3: warm-cache execute in mock mode
fn execute_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut config = Config::default();
    config.routing.mock_mode = true;
    let orchestrator = Orchestrator::from_config(config);
    let descriptor = QueryDescriptor::new(["sessions"]).with_dimensions(["date"]);

    runtime.block_on(orchestrator.execute(&descriptor, "demo"));

    c.bench_function("execute_cached", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(orchestrator.execute(&descriptor, "demo").await);
        });
    });
}

criterion_group!(benches, analyze_benchmark, routing_benchmark, execute_benchmark);
criterion_main!(benches);
