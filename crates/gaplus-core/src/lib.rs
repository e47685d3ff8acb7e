//! gaplus-core - Core library for gaplus
//!
//! Provides query routing between the live reporting API and the warehouse,
//! the result cache, source adapters and trend analysis for web analytics data.

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod routing;
pub mod sources;

pub use analytics::{TrendEngine, TrendReport};
pub use cache::QueryCache;
pub use config::Config;
pub use error::{CacheError, CoreError, ErrorKind, Result, SourceError, SourceErrorKind};
pub use models::{DataSource, DateRange, DateSpec, NormalizedResult, QueryDescriptor};
pub use orchestrator::{Orchestrator, RoutingStats};
pub use routing::{RoutingContext, RoutingDecision, SourceSelector};
pub use sources::{SourceAdapter, SourceSet};
