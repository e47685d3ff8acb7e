//! CLI input loading and output formatting
//!
//! Every formatter renders either pretty JSON or a human table, so the
//! subcommands in `main.rs` stay one call deep.

use anyhow::Context;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use gaplus_core::analytics::TrendReport;
use gaplus_core::cache::{CacheHealth, CacheStats};
use gaplus_core::models::Row;
use gaplus_core::{NormalizedResult, QueryDescriptor, RoutingDecision, RoutingStats};
use serde_json::Value;
use std::path::Path;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    InvalidInput { path: String, reason: String },
    QueryFailed { kind: String, message: String },
    TrendFailed { metric: String, message: String },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::InvalidInput { path, reason } => {
                write!(f, "Invalid input file '{}': {}", path, reason)
            }
            CliError::QueryFailed { kind, message } => {
                write!(f, "Query failed ({}): {}", kind, message)
            }
            CliError::TrendFailed { metric, message } => {
                write!(f, "Trend analysis of '{}' failed: {}", metric, message)
            }
        }
    }
}

impl std::error::Error for CliError {}

// ============================================================================
// Input Loading
// ============================================================================

/// Parse a query descriptor from a JSON file
pub fn read_descriptor(path: &Path) -> anyhow::Result<QueryDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor: {}", path.display()))?;
    let descriptor = serde_json::from_str(&content).map_err(|e| CliError::InvalidInput {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(descriptor)
}

/// Load rows for trend analysis
///
/// Accepts a bare JSON array of rows or an object with a `rows` array,
/// which covers the output of `gaplus query --json`.
pub fn read_rows(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rows: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| CliError::InvalidInput {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    rows_from_value(value).ok_or_else(|| {
        CliError::InvalidInput {
            path: path.display().to_string(),
            reason: "expected an array of rows or an object with a 'rows' array".to_string(),
        }
        .into()
    })
}

fn rows_from_value(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(rows) => Some(rows),
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// Formatters
// ============================================================================

/// Format a query result as table (human) or JSON
pub fn format_result(result: &NormalizedResult, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string());
    }

    if let Some(err) = &result.error {
        return format!("Query failed ({}): {}", err.kind, err.message);
    }

    let mut lines = vec![];
    let meta = &result.metadata;
    let source = meta
        .source
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    match meta.fallback_from {
        Some(from) => lines.push(format!("Source:     {} (fallback from {})", source, from)),
        None => lines.push(format!("Source:     {}", source)),
    }
    if meta.is_mock {
        lines.push("Data:       synthetic (mock)".to_string());
    }
    lines.push(format!("Rows:       {}", result.row_count));
    if let Some(query_type) = &meta.query_type {
        lines.push(format!("Query type: {}", query_type));
    }
    if !meta.routing_reasoning.is_empty() {
        lines.push(format!("Routing:    {}", meta.routing_reasoning.join("; ")));
    }

    if !result.rows.is_empty() {
        lines.push(String::new());
        lines.push(rows_table(&result.rows, no_color));
    }

    if !result.totals.is_empty() {
        lines.push(String::new());
        lines.push("Totals:".to_string());
        lines.push(rows_table(&result.totals, no_color));
    }

    if let Some(report) = &result.trend_analysis {
        lines.push(String::new());
        lines.push(trend_summary(report));
    }

    lines.join("\n")
}

/// Format a routing decision with its factor scores
pub fn format_routing_decision(decision: &RoutingDecision, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(decision).unwrap_or_else(|_| "{}".to_string());
    }

    let mut lines = vec![format!("Selected: {}", decision.selected_source)];

    if decision.scored {
        let mut table = new_table(&["Factor", "Score"], no_color);
        for (factor, score) in &decision.factor_scores {
            table.add_row(vec![factor.clone(), format_score(*score)]);
        }
        lines.push(table.to_string());

        let mut totals = new_table(&["Source", "Weighted total"], no_color);
        for (source, score) in &decision.score_breakdown {
            totals.add_row(vec![source.to_string(), format_score(*score)]);
        }
        lines.push(totals.to_string());
    } else {
        lines.push("Decided by pre-check (no scoring)".to_string());
    }

    lines.push("Reasoning:".to_string());
    for reason in &decision.reasoning {
        lines.push(format!("  - {}", reason));
    }

    lines.join("\n")
}

/// Format a full trend report
pub fn format_trend_report(report: &TrendReport, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    if let Some(err) = &report.error {
        return format!("Trend analysis of '{}' failed: {}", report.metric_name, err);
    }

    let mut lines = vec![trend_summary(report)];
    let period = &report.time_period;
    lines.push(format!(
        "Period:     {} → {} ({} points)",
        period.start.as_deref().unwrap_or("-"),
        period.end.as_deref().unwrap_or("-"),
        period.data_points
    ));

    if let Some(stats) = &report.statistics {
        let mut table = new_table(&["Mean", "Median", "Min", "Max", "Std dev", "CV"], no_color);
        table.add_row(vec![
            format_number(stats.mean),
            format_number(stats.median),
            format_number(stats.min),
            format_number(stats.max),
            stats.std_dev.map(format_number).unwrap_or_else(|| "-".to_string()),
            stats
                .coefficient_of_variation
                .map(format_score)
                .unwrap_or_else(|| "-".to_string()),
        ]);
        lines.push(table.to_string());
    }

    if let Some(change) = &report.change_analysis {
        lines.push(format!(
            "Change:     {:+.1}% overall, {:+.1}% average per period",
            change.overall * 100.0,
            change.average * 100.0
        ));
    }

    if !report.anomalies.is_empty() {
        let mut table = new_table(&["Date", "Value", "Type", "Severity"], no_color);
        for anomaly in &report.anomalies {
            table.add_row(vec![
                anomaly.date.clone(),
                format_number(anomaly.value),
                serde_json::to_value(&anomaly.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                format!("{:.2}", anomaly.severity),
            ]);
        }
        lines.push("Anomalies:".to_string());
        lines.push(table.to_string());
    }

    if let Some(outcome) = &report.forecast {
        match outcome.projection() {
            Some(forecast) => lines.push(format!(
                "Forecast:   {} (confidence {})",
                forecast
                    .forecasted_values
                    .iter()
                    .map(|v| format_number(*v))
                    .collect::<Vec<_>>()
                    .join(", "),
                forecast.confidence
            )),
            None => lines.push("Forecast:   unavailable".to_string()),
        }
    }

    if !report.insights.is_empty() {
        lines.push("Insights:".to_string());
        for insight in &report.insights {
            lines.push(format!("  - {}", insight));
        }
    }

    lines.join("\n")
}

/// Format routing diagnostics
pub fn format_routing_stats(stats: &RoutingStats, json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string());
    }

    let mut sources = new_table(&["Source", "Available"], no_color);
    for (source, available) in &stats.sources_available {
        sources.add_row(vec![source.to_string(), yes_no(*available).to_string()]);
    }

    let w = &stats.weights;
    let mut weights = new_table(&["Factor", "Weight"], no_color);
    for (name, weight) in [
        ("data_volume", w.data_volume),
        ("query_complexity", w.query_complexity),
        ("date_range", w.date_range),
        ("performance", w.performance),
        ("availability", w.availability),
    ] {
        weights.add_row(vec![name.to_string(), format!("{:.2}", weight)]);
    }

    [
        format!("Warehouse routing: {}", enabled_disabled(stats.routing_enabled)),
        format!("Mock mode:         {}", enabled_disabled(stats.mock_mode)),
        sources.to_string(),
        weights.to_string(),
    ]
    .join("\n")
}

/// Format cache counters and backend health
pub fn format_cache_stats(
    stats: &CacheStats,
    health: &CacheHealth,
    json: bool,
    no_color: bool,
) -> String {
    if json {
        let value = serde_json::json!({ "stats": stats, "health": health });
        return serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    }

    let mut table = new_table(&["Hits", "Misses", "Hit rate", "Sets", "Deletes", "Errors"], no_color);
    table.add_row(vec![
        stats.hits.to_string(),
        stats.misses.to_string(),
        format!("{:.1}%", stats.hit_rate * 100.0),
        stats.sets.to_string(),
        stats.deletes.to_string(),
        stats.errors.to_string(),
    ]);

    let remote = match health.remote {
        Some(true) => "connected",
        Some(false) => "unreachable",
        None => "not configured",
    };

    [
        format!("Cache type: {}", stats.cache_type),
        format!(
            "Memory:     {}/{} entries ({})",
            stats.memory_entries,
            stats.memory_capacity,
            if health.memory { "ok" } else { "failing" }
        ),
        format!("Redis:      {}", remote),
        table.to_string(),
    ]
    .join("\n")
}

// ============================================================================
// Utilities
// ============================================================================

fn new_table(headers: &[&str], no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }

    table
}

/// Columns in first-seen order across all rows
fn column_names(rows: &[Row]) -> Vec<&str> {
    let mut columns: Vec<&str> = vec![];
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    columns
}

fn rows_table(rows: &[Row], no_color: bool) -> String {
    let columns = column_names(rows);
    let mut table = new_table(&columns, no_color);

    for row in rows {
        table.add_row(
            columns
                .iter()
                .map(|c| row.get(*c).map(|v| truncate(&v.to_string(), 40)).unwrap_or_default())
                .collect::<Vec<_>>(),
        );
    }

    table.to_string()
}

fn trend_summary(report: &TrendReport) -> String {
    let trend = &report.trend;
    let mut line = format!(
        "Trend:      {} {} on {} (confidence {:.2}",
        trend.strength, trend.direction, report.metric_name, trend.confidence
    );
    if let Some(p) = trend.p_value {
        line.push_str(&format!(", p={:.4}", p));
    }
    line.push(')');
    line
}

fn format_score(score: f64) -> String {
    format!("{:.3}", score)
}

fn format_number(value: f64) -> String {
    if value.abs() >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value.abs() >= 10_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn enabled_disabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).collect::<String>() + "…"
    }
}

// ============================================================================
// Tests
// ============================================================================
