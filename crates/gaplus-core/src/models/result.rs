//! Normalized query results shared by every source

use crate::analytics::TrendReport;
use crate::error::{CoreError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backing source able to serve a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Low-latency reporting API (GA4 Data API)
    LiveApi,
    /// Batch warehouse over the raw event export (BigQuery)
    Warehouse,
    /// Deterministic offline data
    Mock,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [DataSource::LiveApi, DataSource::Warehouse, DataSource::Mock];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::LiveApi => "live_api",
            DataSource::Warehouse => "warehouse",
            DataSource::Mock => "mock",
        }
    }

    /// The one source tried after this one fails
    pub fn alternate(&self) -> Option<DataSource> {
        match self {
            DataSource::LiveApi => Some(DataSource::Warehouse),
            DataSource::Warehouse => Some(DataSource::LiveApi),
            DataSource::Mock => None,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cell value in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parse a reporting-API number string: float if it has a decimal point, else integer
    pub fn parse_numeric(raw: &str) -> Scalar {
        if raw.contains('.') {
            raw.parse::<f64>()
                .map(Scalar::Float)
                .unwrap_or_else(|_| Scalar::Text(raw.to_string()))
        } else {
            raw.parse::<i64>()
                .map(Scalar::Int)
                .unwrap_or_else(|_| Scalar::Text(raw.to_string()))
        }
    }

    /// Numeric view of the value; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// Column name → value
pub type Row = BTreeMap<String, Scalar>;

/// Provenance attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Source that produced the rows (None for error results)
    pub source: Option<DataSource>,
    #[serde(default)]
    pub is_mock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing_reasoning: Vec<String>,
    /// Set when the rows come from the alternate after the selected source failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<DataSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

impl ResultMetadata {
    pub fn new(source: DataSource, target_id: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            is_mock: source == DataSource::Mock,
            target_id: Some(target_id.into()),
            fetched_at: Utc::now(),
            routing_reasoning: Vec::new(),
            fallback_from: None,
            query_type: None,
        }
    }

    fn empty() -> Self {
        Self {
            source: None,
            is_mock: false,
            target_id: None,
            fetched_at: Utc::now(),
            routing_reasoning: Vec::new(),
            fallback_from: None,
            query_type: None,
        }
    }
}

/// Error payload of a failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Rows and totals in a source-independent shape
///
/// When `error` is set, `rows` and `totals` are empty and `row_count` is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub rows: Vec<Row>,
    #[serde(default)]
    pub totals: Vec<Row>,
    pub row_count: usize,
    pub metadata: ResultMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_analysis: Option<TrendReport>,
}

impl NormalizedResult {
    pub fn new(rows: Vec<Row>, totals: Vec<Row>, metadata: ResultMetadata) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            totals,
            metadata,
            error: None,
            trend_analysis: None,
        }
    }

    /// Error result with no rows
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            totals: Vec::new(),
            row_count: 0,
            metadata: ResultMetadata::empty(),
            error: Some(ResultError {
                kind,
                message: message.into(),
            }),
            trend_analysis: None,
        }
    }

    pub fn from_core_error(err: &CoreError) -> Self {
        Self::error(err.result_kind(), err.to_string())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
