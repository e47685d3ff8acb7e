//! Warehouse adapter (BigQuery over the daily GA4 `events_*` export)
//!
//! Translates a descriptor into standard SQL over the export tables and runs
//! it through the synchronous `jobs.query` REST endpoint.

use super::live_api::{classify_transport, error_from_response};
use super::{sum_totals, SourceAdapter};
use crate::config::WarehouseConfig;
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{DataSource, NormalizedResult, QueryDescriptor, ResultMetadata, Row, Scalar};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Target id that never filters by stream
const DEMO_TARGET: &str = "demo_property";

fn dimension_expr(name: &str) -> String {
    match name {
        "date" => "PARSE_DATE('%Y%m%d', event_date) AS date".to_string(),
        "pageTitle" => "(SELECT value.string_value FROM UNNEST(event_params) WHERE key = 'page_title') AS pageTitle".to_string(),
        "pagePath" | "pageLocation" => format!(
            "(SELECT value.string_value FROM UNNEST(event_params) WHERE key = 'page_location') AS {}",
            name
        ),
        "eventName" => "event_name AS eventName".to_string(),
        "country" => "geo.country AS country".to_string(),
        "city" => "geo.city AS city".to_string(),
        "deviceCategory" => "device.category AS deviceCategory".to_string(),
        "sessionSource" => "traffic_source.source AS sessionSource".to_string(),
        "sessionDefaultChannelGrouping" => {
            "traffic_source.medium AS sessionDefaultChannelGrouping".to_string()
        }
        // Names are validated identifiers, safe to inline
        other => format!("'{}' AS {}", other, other),
    }
}

fn metric_expr(name: &str) -> String {
    match name {
        "totalUsers" | "activeUsers" => format!("COUNT(DISTINCT user_pseudo_id) AS {}", name),
        "newUsers" => "COUNTIF(event_name = 'first_visit') AS newUsers".to_string(),
        "sessions" => "COUNT(DISTINCT CONCAT(user_pseudo_id, CAST((SELECT value.int_value FROM UNNEST(event_params) WHERE key = 'ga_session_id') AS STRING))) AS sessions".to_string(),
        "screenPageViews" => "COUNTIF(event_name = 'page_view') AS screenPageViews".to_string(),
        "eventCount" => "COUNT(*) AS eventCount".to_string(),
        "conversions" => "COUNTIF(event_name IN ('purchase', 'conversion')) AS conversions".to_string(),
        "totalRevenue" => "SUM(ecommerce.purchase_revenue) AS totalRevenue".to_string(),
        other => format!("0 AS {}", other),
    }
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Standard SQL for a descriptor, resolving relative dates against `today`
///
/// Only the first date range bounds the table-suffix window.
pub fn build_sql(
    descriptor: &QueryDescriptor,
    project_id: &str,
    dataset_id: &str,
    target_id: &str,
    today: NaiveDate,
) -> String {
    let mut select: Vec<String> = descriptor.dimension_names().map(dimension_expr).collect();
    select.extend(descriptor.metric_names().map(metric_expr));
    if select.is_empty() {
        select.push("COUNT(*) AS total_events".to_string());
    }

    let mut conditions = Vec::new();
    if let Some(range) = descriptor.date_ranges.first() {
        let (start, end) = range.resolve(today);
        conditions.push(format!(
            "_TABLE_SUFFIX BETWEEN '{}' AND '{}'",
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        ));
    }
    if !target_id.is_empty() && target_id != DEMO_TARGET {
        conditions.push(format!("stream_id = '{}'", escape_literal(target_id)));
    }

    let mut sql = format!(
        "SELECT\n  {}\nFROM `{}.{}.events_*`",
        select.join(",\n  "),
        project_id,
        dataset_id
    );
    if !conditions.is_empty() {
        sql.push_str(&format!("\nWHERE {}", conditions.join(" AND ")));
    }

    let dims = descriptor.dimensions.len();
    if dims > 0 {
        let positions: Vec<String> = (1..=dims).map(|i| i.to_string()).collect();
        sql.push_str(&format!("\nGROUP BY {}", positions.join(", ")));
        sql.push_str(&format!("\nORDER BY {} DESC", dims + 1));
    }
    sql.push_str(&format!("\nLIMIT {}", descriptor.limit));
    if descriptor.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", descriptor.offset));
    }
    sql
}

// ===== Wire types =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryResponse {
    schema: Schema,
    rows: Vec<WireRow>,
    job_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Schema {
    fields: Vec<Field>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Field {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRow {
    f: Vec<Cell>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Cell {
    v: Value,
}

fn cell_to_scalar(field_type: &str, value: &Value) -> Option<Scalar> {
    let raw = value.as_str()?;
    let scalar = match field_type {
        "INTEGER" | "INT64" => raw
            .parse::<i64>()
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        // DATE comes back as YYYY-MM-DD; keep the reporting API shape
        "DATE" => Scalar::Text(raw.replace('-', "")),
        _ => Scalar::Text(raw.to_string()),
    };
    Some(scalar)
}

// ===== Adapter =====

pub struct WarehouseAdapter {
    config: WarehouseConfig,
    routing_enabled: bool,
    client: reqwest::Client,
}

impl WarehouseAdapter {
    pub fn new(config: WarehouseConfig, routing_enabled: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            routing_enabled,
            client,
        }
    }

    fn normalize(response: QueryResponse, descriptor: &QueryDescriptor, target_id: &str) -> NormalizedResult {
        let fields = &response.schema.fields;
        let rows: Vec<Row> = response
            .rows
            .iter()
            .map(|wire| {
                fields
                    .iter()
                    .zip(&wire.f)
                    .filter_map(|(field, cell)| {
                        cell_to_scalar(&field.field_type, &cell.v).map(|s| (field.name.clone(), s))
                    })
                    .collect()
            })
            .collect();

        let totals = sum_totals(&rows, descriptor.metric_names());
        NormalizedResult::new(rows, totals, ResultMetadata::new(DataSource::Warehouse, target_id))
    }
}

#[async_trait]
impl SourceAdapter for WarehouseAdapter {
    fn source(&self) -> DataSource {
        DataSource::Warehouse
    }

    async fn run(
        &self,
        descriptor: &QueryDescriptor,
        target_id: &str,
    ) -> Result<NormalizedResult, SourceError> {
        let (Some(project), Some(dataset), Some(token)) = (
            self.config.project_id.as_deref(),
            self.config.dataset_id.as_deref(),
            self.config.access_token.as_deref(),
        ) else {
            return Err(SourceError::unavailable(
                DataSource::Warehouse,
                "warehouse project, dataset or token not configured",
            ));
        };

        let sql = build_sql(
            descriptor,
            project,
            dataset,
            target_id,
            chrono::Local::now().date_naive(),
        );
        debug!(target_id, sql = %sql.chars().take(200).collect::<String>(), "Executing warehouse query");

        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.config.timeout_secs.saturating_mul(1000),
        };
        let url = format!(
            "{}/projects/{}/queries",
            self.config.base_url.trim_end_matches('/'),
            project
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(DataSource::Warehouse, &e))?;

        if !response.status().is_success() {
            return Err(error_from_response(DataSource::Warehouse, response).await);
        }

        let body: QueryResponse = response.json().await.map_err(|e| {
            SourceError::new(
                DataSource::Warehouse,
                SourceErrorKind::Unknown,
                format!("malformed query response: {}", e),
            )
        })?;

        if !body.job_complete {
            return Err(SourceError::timeout(DataSource::Warehouse, self.config.timeout_secs));
        }

        let result = Self::normalize(body, descriptor, target_id);
        info!(target_id, row_count = result.row_count, "Warehouse query completed");
        Ok(result)
    }

    fn is_available(&self) -> bool {
        self.routing_enabled
            && self.config.project_id.is_some()
            && self.config.dataset_id.is_some()
            && self.config.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, DateSpec};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn test_sql_with_dimensions() {
        let q = QueryDescriptor::new(["totalUsers", "screenPageViews", "bounceRate"])
            .with_dimensions(["date", "pageTitle"])
            .with_date_ranges(vec![DateRange::new(DateSpec::DaysAgo(30), DateSpec::Today)])
            .with_limit(50);
        let sql = build_sql(&q, "proj", "analytics_1", "987", today());

        assert!(sql.contains("FROM `proj.analytics_1.events_*`"));
        assert!(sql.contains("PARSE_DATE('%Y%m%d', event_date) AS date"));
        assert!(sql.contains("key = 'page_title') AS pageTitle"));
        assert!(sql.contains("COUNT(DISTINCT user_pseudo_id) AS totalUsers"));
        assert!(sql.contains("COUNTIF(event_name = 'page_view') AS screenPageViews"));
        assert!(sql.contains("0 AS bounceRate"));
        assert!(sql.contains("_TABLE_SUFFIX BETWEEN '20240301' AND '20240331'"));
        assert!(sql.contains("stream_id = '987'"));
        assert!(sql.contains("GROUP BY 1, 2"));
        assert!(sql.contains("ORDER BY 3 DESC"));
        assert!(sql.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_sql_aggregate_demo_target() {
        let q = QueryDescriptor::new(["sessions"]);
        let sql = build_sql(&q, "p", "d", DEMO_TARGET, today());
        assert!(!sql.contains("stream_id"));
        assert!(!sql.contains("GROUP BY"));
        assert!(!sql.contains("ORDER BY"));
    }

    #[test]
    fn test_target_is_escaped() {
        let q = QueryDescriptor::new(["sessions"]);
        let sql = build_sql(&q, "p", "d", "x' OR '1'='1", today());
        assert!(sql.contains(r"stream_id = 'x\' OR \'1\'=\'1'"));
    }

    #[test]
    fn test_normalize_typed_cells_and_totals() {
        let q = QueryDescriptor::new(["totalUsers", "totalRevenue"]).with_dimensions(["date"]);
        let response: QueryResponse = serde_json::from_value(json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "date", "type": "DATE"},
                {"name": "totalUsers", "type": "INTEGER"},
                {"name": "totalRevenue", "type": "FLOAT"}
            ]},
            "rows": [
                {"f": [{"v": "2024-03-02"}, {"v": "40"}, {"v": "12.5"}]},
                {"f": [{"v": "2024-03-01"}, {"v": "60"}, {"v": null}]}
            ]
        }))
        .unwrap();

        let result = WarehouseAdapter::normalize(response, &q, "987");
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0]["date"], Scalar::Text("20240302".into()));
        assert_eq!(result.rows[1]["totalUsers"], Scalar::Int(60));
        assert!(!result.rows[1].contains_key("totalRevenue"), "Null cells are dropped");
        assert_eq!(result.totals[0]["totalUsers"], Scalar::Int(100));
        assert_eq!(result.totals[0]["totalRevenue"], Scalar::Float(12.5));
    }

    #[test]
    fn test_availability_requires_config_and_routing() {
        let configured = WarehouseConfig {
            project_id: Some("p".into()),
            dataset_id: Some("d".into()),
            access_token: Some("t".into()),
            ..WarehouseConfig::default()
        };
        assert!(WarehouseAdapter::new(configured.clone(), true).is_available());
        assert!(!WarehouseAdapter::new(configured, false).is_available());
        assert!(!WarehouseAdapter::new(WarehouseConfig::default(), true).is_available());
    }
}
