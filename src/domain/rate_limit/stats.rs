//! Aggregate view over the counter key space.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::config::Algorithm;

/// How many endpoints `top_endpoints` reports.
pub const TOP_ENDPOINTS: usize = 10;

/// Key count for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointKeyCount {
    pub endpoint_name: String,
    pub keys: u64,
}

/// Snapshot of limiter usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    /// Counter keys found.
    pub total_keys: u64,
    /// Counter keys still carrying a live TTL.
    pub active_keys: u64,
    /// Counter keys per algorithm.
    pub algorithm_counts: BTreeMap<Algorithm, u64>,
    /// Endpoints with the most counter keys, descending.
    pub top_endpoints: Vec<EndpointKeyCount>,
}

impl RateLimitStats {
    /// Records one counter key.
    pub fn record_key(
        &mut self,
        algorithm: Algorithm,
        active: bool,
        endpoint: &str,
        per_endpoint: &mut HashMap<String, u64>,
    ) {
        self.total_keys += 1;
        if active {
            self.active_keys += 1;
        }
        *self.algorithm_counts.entry(algorithm).or_insert(0) += 1;
        *per_endpoint.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    /// Fills `top_endpoints` from the per-endpoint tally.
    pub fn finish(mut self, per_endpoint: HashMap<String, u64>) -> Self {
        let mut ranked: Vec<EndpointKeyCount> = per_endpoint
            .into_iter()
            .map(|(endpoint_name, keys)| EndpointKeyCount { endpoint_name, keys })
            .collect();
        ranked.sort_by(|a, b| b.keys.cmp(&a.keys).then_with(|| a.endpoint_name.cmp(&b.endpoint_name)));
        ranked.truncate(TOP_ENDPOINTS);
        self.top_endpoints = ranked;
        self
    }
}
