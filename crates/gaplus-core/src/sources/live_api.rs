//! Live reporting API adapter (GA4 Data API `runReport`)

use super::SourceAdapter;
use crate::config::LiveApiConfig;
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{DataSource, NormalizedResult, QueryDescriptor, ResultMetadata, Row, Scalar};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

// ===== Wire types =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    date_ranges: Vec<WireDateRange>,
    dimensions: Vec<WireName>,
    metrics: Vec<WireName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<Value>,
    limit: String,
    offset: String,
    metric_aggregations: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireName {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunReportResponse {
    dimension_headers: Vec<WireName>,
    metric_headers: Vec<WireName>,
    rows: Vec<WireRow>,
    totals: Vec<WireRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireRow {
    dimension_values: Vec<WireValue>,
    metric_values: Vec<WireValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireValue {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiError {
    message: String,
    status: String,
}

// ===== Adapter =====

pub struct LiveApiAdapter {
    config: LiveApiConfig,
    client: reqwest::Client,
}

impl LiveApiAdapter {
    pub fn new(config: LiveApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn endpoint(&self, target_id: &str) -> String {
        format!(
            "{}/properties/{}:runReport",
            self.config.base_url.trim_end_matches('/'),
            target_id
        )
    }

    fn build_request(descriptor: &QueryDescriptor) -> RunReportRequest {
        RunReportRequest {
            date_ranges: descriptor
                .date_ranges
                .iter()
                .map(|r| WireDateRange {
                    start_date: r.start_date.to_string(),
                    end_date: r.end_date.to_string(),
                })
                .collect(),
            dimensions: descriptor
                .dimension_names()
                .map(|name| WireName { name: name.to_string() })
                .collect(),
            metrics: descriptor
                .metric_names()
                .map(|name| WireName { name: name.to_string() })
                .collect(),
            dimension_filter: descriptor.filters.as_ref().and_then(build_dimension_filter),
            limit: descriptor.limit.to_string(),
            offset: descriptor.offset.to_string(),
            metric_aggregations: vec!["TOTAL"],
        }
    }

    fn normalize(
        descriptor: &QueryDescriptor,
        response: RunReportResponse,
        target_id: &str,
    ) -> NormalizedResult {
        // Prefer response headers; fall back to request order
        let dim_names: Vec<String> = if response.dimension_headers.is_empty() {
            descriptor.dimension_names().map(str::to_string).collect()
        } else {
            response.dimension_headers.into_iter().map(|h| h.name).collect()
        };
        let metric_names: Vec<String> = if response.metric_headers.is_empty() {
            descriptor.metric_names().map(str::to_string).collect()
        } else {
            response.metric_headers.into_iter().map(|h| h.name).collect()
        };

        let to_row = |wire: WireRow, with_dims: bool| -> Row {
            let mut row = Row::new();
            if with_dims {
                for (i, v) in wire.dimension_values.into_iter().enumerate() {
                    let name = dim_names
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("dimension_{}", i));
                    row.insert(name, Scalar::Text(v.value));
                }
            }
            for (i, v) in wire.metric_values.into_iter().enumerate() {
                let name = metric_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("metric_{}", i));
                row.insert(name, Scalar::parse_numeric(&v.value));
            }
            row
        };

        let rows: Vec<Row> = response.rows.into_iter().map(|r| to_row(r, true)).collect();
        let totals: Vec<Row> = response.totals.into_iter().map(|r| to_row(r, false)).collect();

        NormalizedResult::new(rows, totals, ResultMetadata::new(DataSource::LiveApi, target_id))
    }
}

/// Equality filters `{dimension: "value"}` as an AND of exact string matches
///
/// Non-string values have no exact-match form and are skipped.
fn build_dimension_filter(filters: &std::collections::BTreeMap<String, Value>) -> Option<Value> {
    let expressions: Vec<Value> = filters
        .iter()
        .filter_map(|(field, value)| {
            let value = value.as_str()?;
            Some(json!({
                "filter": {
                    "fieldName": field,
                    "stringFilter": { "matchType": "EXACT", "value": value }
                }
            }))
        })
        .collect();

    match expressions.len() {
        0 => None,
        1 => expressions.into_iter().next(),
        _ => Some(json!({ "andGroup": { "expressions": expressions } })),
    }
}

/// Map an HTTP failure onto the adapter error taxonomy
pub(crate) fn classify_status(status: StatusCode, api_status: &str) -> SourceErrorKind {
    match api_status {
        "INVALID_ARGUMENT" => return SourceErrorKind::InvalidArgument,
        "RESOURCE_EXHAUSTED" => return SourceErrorKind::QuotaExceeded,
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => return SourceErrorKind::PermissionDenied,
        _ => {}
    }
    match status.as_u16() {
        400 => SourceErrorKind::InvalidArgument,
        401 | 403 => SourceErrorKind::PermissionDenied,
        429 => SourceErrorKind::QuotaExceeded,
        408 | 504 => SourceErrorKind::Timeout,
        500..=599 => SourceErrorKind::Unavailable,
        _ => SourceErrorKind::Unknown,
    }
}

/// Map a transport failure onto the adapter error taxonomy
pub(crate) fn classify_transport(source: DataSource, err: &reqwest::Error) -> SourceError {
    let kind = if err.is_timeout() {
        SourceErrorKind::Timeout
    } else if err.is_connect() || err.is_request() {
        SourceErrorKind::Unavailable
    } else {
        SourceErrorKind::Unknown
    };
    SourceError::new(source, kind, err.to_string())
}

/// Turn a non-success response into a typed error
pub(crate) async fn error_from_response(source: DataSource, response: reqwest::Response) -> SourceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();

    let message = if parsed.error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, parsed.error.message)
    };
    SourceError::new(source, classify_status(status, &parsed.error.status), message)
}

#[async_trait]
impl SourceAdapter for LiveApiAdapter {
    fn source(&self) -> DataSource {
        DataSource::LiveApi
    }

    async fn run(
        &self,
        descriptor: &QueryDescriptor,
        target_id: &str,
    ) -> Result<NormalizedResult, SourceError> {
        let token = self.config.access_token.as_deref().ok_or_else(|| {
            SourceError::unavailable(DataSource::LiveApi, "no access token configured")
        })?;

        if descriptor.metrics.is_empty() || descriptor.date_ranges.is_empty() {
            return Err(SourceError::new(
                DataSource::LiveApi,
                SourceErrorKind::InvalidArgument,
                "metrics and date_ranges are required",
            ));
        }

        let request = Self::build_request(descriptor);
        debug!(target_id, metrics = request.metrics.len(), dimensions = request.dimensions.len(), "Sending runReport");

        let response = self
            .client
            .post(self.endpoint(target_id))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(DataSource::LiveApi, &e))?;

        if !response.status().is_success() {
            return Err(error_from_response(DataSource::LiveApi, response).await);
        }

        let body: RunReportResponse = response.json().await.map_err(|e| {
            SourceError::new(
                DataSource::LiveApi,
                SourceErrorKind::Unknown,
                format!("malformed runReport response: {}", e),
            )
        })?;

        let result = Self::normalize(descriptor, body, target_id);
        info!(target_id, row_count = result.row_count, "Live API query completed");
        Ok(result)
    }

    fn is_available(&self) -> bool {
        self.config.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, DateSpec};
    use std::collections::BTreeMap;

    #[test]
    fn test_request_shape() {
        let q = QueryDescriptor::new(["sessions"])
            .with_dimensions(["date"])
            .with_date_ranges(vec![DateRange::new(DateSpec::DaysAgo(7), DateSpec::Today)])
            .with_limit(25);
        let body = serde_json::to_value(LiveApiAdapter::build_request(&q)).unwrap();

        assert_eq!(body["dateRanges"][0]["startDate"], "7daysAgo");
        assert_eq!(body["dateRanges"][0]["endDate"], "today");
        assert_eq!(body["metrics"][0]["name"], "sessions");
        assert_eq!(body["dimensions"][0]["name"], "date");
        assert_eq!(body["limit"], "25");
        assert!(body.get("dimensionFilter").is_none());
    }

    #[test]
    fn test_filters_become_and_group() {
        let mut filters = BTreeMap::new();
        filters.insert("country".to_string(), json!("Taiwan"));
        filters.insert("deviceCategory".to_string(), json!("mobile"));
        filters.insert("ignored".to_string(), json!(3));

        let filter = build_dimension_filter(&filters).unwrap();
        let expressions = filter["andGroup"]["expressions"].as_array().unwrap();
        assert_eq!(expressions.len(), 2);
        assert_eq!(expressions[0]["filter"]["fieldName"], "country");
    }

    #[test]
    fn test_normalize_parses_numbers() {
        let q = QueryDescriptor::new(["sessions", "bounceRate"]).with_dimensions(["date"]);
        let response: RunReportResponse = serde_json::from_value(json!({
            "dimensionHeaders": [{"name": "date"}],
            "metricHeaders": [{"name": "sessions", "type": "TYPE_INTEGER"}, {"name": "bounceRate", "type": "TYPE_FLOAT"}],
            "rows": [
                {"dimensionValues": [{"value": "20240101"}], "metricValues": [{"value": "120"}, {"value": "0.41"}]}
            ],
            "totals": [
                {"dimensionValues": [{"value": "RESERVED_TOTAL"}], "metricValues": [{"value": "120"}, {"value": "0.41"}]}
            ],
            "rowCount": 1
        }))
        .unwrap();

        let result = LiveApiAdapter::normalize(&q, response, "123");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["date"], Scalar::Text("20240101".into()));
        assert_eq!(result.rows[0]["sessions"], Scalar::Int(120));
        assert_eq!(result.rows[0]["bounceRate"], Scalar::Float(0.41));
        assert!(!result.totals[0].contains_key("date"));
        assert_eq!(result.metadata.target_id.as_deref(), Some("123"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, ""), SourceErrorKind::InvalidArgument);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, ""), SourceErrorKind::PermissionDenied);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, ""), SourceErrorKind::QuotaExceeded);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, ""), SourceErrorKind::Unavailable);
        assert_eq!(classify_status(StatusCode::IM_A_TEAPOT, ""), SourceErrorKind::Unknown);
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "RESOURCE_EXHAUSTED"),
            SourceErrorKind::QuotaExceeded
        );
    }

    #[tokio::test]
    async fn test_without_token_is_unavailable() {
        let adapter = LiveApiAdapter::new(LiveApiConfig::default());
        assert!(!adapter.is_available());

        let err = adapter
            .run(&QueryDescriptor::new(["sessions"]), "123")
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Unavailable);
    }
}
