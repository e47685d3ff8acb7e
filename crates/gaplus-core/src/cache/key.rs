//! Content-addressed cache keys
//!
//! Two descriptors that differ only in metric or dimension order map to the
//! same key. Everything else that changes the result (window, target,
//! filters, paging) changes the key.

use crate::models::{DateRange, QueryDescriptor};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex characters kept from the SHA-256 digest
pub const KEY_DIGEST_LEN: usize = 16;

/// Namespace for query results inside the store prefix
pub const QUERY_NAMESPACE: &str = "query";

// Field order is the serialization order; keep it alphabetical
#[derive(Serialize)]
struct KeyMaterial<'a> {
    date_ranges: &'a [DateRange],
    dimensions: Vec<&'a str>,
    filters: Option<&'a BTreeMap<String, serde_json::Value>>,
    limit: u32,
    metrics: Vec<&'a str>,
    offset: u32,
    target_id: &'a str,
}

/// Truncated hex SHA-256 of the canonical descriptor
pub fn query_digest(descriptor: &QueryDescriptor, target_id: &str) -> String {
    let mut metrics: Vec<&str> = descriptor.metric_names().collect();
    metrics.sort_unstable();
    let mut dimensions: Vec<&str> = descriptor.dimension_names().collect();
    dimensions.sort_unstable();

    let material = KeyMaterial {
        date_ranges: &descriptor.date_ranges,
        dimensions,
        filters: descriptor.filters.as_ref(),
        limit: descriptor.limit,
        metrics,
        offset: descriptor.offset,
        target_id,
    };

    // Serializing plain strings, integers and maps cannot fail
    let canonical = serde_json::to_vec(&material).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let mut hex = hex::encode(digest);
    hex.truncate(KEY_DIGEST_LEN);
    hex
}

/// Store key (without the store prefix) for a query result
pub fn query_key(descriptor: &QueryDescriptor, target_id: &str) -> String {
    format!("{}:{}", QUERY_NAMESPACE, query_digest(descriptor, target_id))
}
