//! Error types for gaplus-core
//!
//! Provides the error hierarchy used across routing, sources, cache and analytics.
//! Only validation failures and "all sources failed" ever reach the caller, and
//! even those are folded into an error [`NormalizedResult`](crate::models::NormalizedResult)
//! by the orchestrator instead of being raised.

use crate::models::DataSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Core error type for gaplus operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Request Errors
    // ===================
    #[error("Invalid query descriptor: {message}")]
    Validation { message: String },

    // ===================
    // Source Errors
    // ===================
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("All data sources failed: {}", all_sources_message(.primary, .fallback.as_ref()))]
    AllSourcesFailed {
        primary: SourceError,
        fallback: Option<SourceError>,
    },

    // ===================
    // Degradable Errors
    // ===================
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Trend analysis failed for {metric}: {message}")]
    TrendAnalysis { metric: String, message: String },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

fn all_sources_message(primary: &SourceError, fallback: Option<&SourceError>) -> String {
    match fallback {
        Some(fallback) => format!("{}; fallback: {}", primary, fallback),
        None => format!("{}; no fallback available", primary),
    }
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Kind reported to callers when this error ends a request
    pub fn result_kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation { .. } => ErrorKind::Validation,
            CoreError::AllSourcesFailed { .. } => ErrorKind::AllSourcesFailed,
            CoreError::Source(e) => ErrorKind::Source(e.kind),
            CoreError::Cache(_) => ErrorKind::Cache,
            CoreError::TrendAnalysis { .. } => ErrorKind::TrendAnalysis,
            CoreError::Config { .. } => ErrorKind::Config,
        }
    }
}

/// Failure classes an adapter may report across the source boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Descriptor rejected by the backend
    InvalidArgument,
    /// Backend quota exhausted
    QuotaExceeded,
    /// Credentials lack access to the target
    PermissionDenied,
    /// Backend unreachable, unconfigured or returning 5xx
    Unavailable,
    /// Call exceeded its time budget
    Timeout,
    /// Anything that could not be classified
    Unknown,
}

impl SourceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::QuotaExceeded => "quota_exceeded",
            Self::PermissionDenied => "permission_denied",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed adapter failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{source_name} {kind}: {message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    #[serde(rename = "source")]
    pub source_name: DataSource,
    pub message: String,
}

impl SourceError {
    pub fn new(source: DataSource, kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            source_name: source,
            message: message.into(),
        }
    }

    pub fn unavailable(source: DataSource, message: impl Into<String>) -> Self {
        Self::new(source, SourceErrorKind::Unavailable, message)
    }

    pub fn timeout(source: DataSource, after_secs: u64) -> Self {
        Self::new(
            source,
            SourceErrorKind::Timeout,
            format!("no response after {}s", after_secs),
        )
    }
}

/// Cache backend failure (never fatal)
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unreachable: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cache value could not be (de)serialized")]
    Serde(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}

impl CacheError {
    pub fn is_connection(&self) -> bool {
        matches!(self, CacheError::Connection(_))
    }
}

/// Error kind carried by an error result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AllSourcesFailed,
    Source(SourceErrorKind),
    Cache,
    TrendAnalysis,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::AllSourcesFailed => f.write_str("all_sources_failed"),
            ErrorKind::Source(kind) => write!(f, "source:{}", kind),
            ErrorKind::Cache => f.write_str("cache"),
            ErrorKind::TrendAnalysis => f.write_str("trend_analysis"),
            ErrorKind::Config => f.write_str("config"),
        }
    }
}

/// Result alias for gaplus-core
pub type Result<T> = std::result::Result<T, CoreError>;
