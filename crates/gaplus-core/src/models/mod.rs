//! Data models for gaplus

pub mod dates;
pub mod descriptor;
pub mod result;

pub use dates::{DateRange, DateSpec};
pub use descriptor::{DimensionRef, MetricRef, QueryDescriptor};
pub use result::{DataSource, NormalizedResult, ResultError, ResultMetadata, Row, Scalar};
