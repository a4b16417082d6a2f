//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CiteTree metrics
pub const METRICS_PREFIX: &str = "citetree";

/// Histogram buckets for HTTP request latency (in seconds).
/// Tree builds fan out to the network, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 1m
    120.0,  // 2m
];

/// Buckets for single upstream calls
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Where a reference resolution was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Store,
    Upstream,
    Omitted,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Cache => "cache",
            ResolutionSource::Store => "store",
            ResolutionSource::Upstream => "upstream",
            ResolutionSource::Omitted => "omitted",
        }
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Resolution metrics
    describe_counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Reference resolutions by answering source"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total metadata API requests"
    );

    describe_histogram!(
        format!("{}_upstream_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Metadata API latency in seconds"
    );

    describe_counter!(
        format!("{}_upstream_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total metadata API errors"
    );

    // Tree metrics
    describe_counter!(
        format!("{}_tree_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Total citation trees built"
    );

    describe_histogram!(
        format!("{}_tree_build_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Citation tree build latency in seconds"
    );

    describe_histogram!(
        format!("{}_tree_nodes", METRICS_PREFIX),
        Unit::Count,
        "Nodes per built citation tree"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one reference resolution
pub fn record_resolution(source: ResolutionSource) {
    counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        "source" => source.as_str()
    )
    .increment(1);
}

/// Helper to record upstream metrics
pub fn record_upstream(duration_secs: f64, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_upstream_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_upstream_duration_seconds", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_upstream_errors_total", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a finished tree build
pub fn record_tree_build(duration_secs: f64, node_count: usize, max_depth: usize) {
    counter!(
        format!("{}_tree_builds_total", METRICS_PREFIX),
        "max_depth" => max_depth.to_string()
    )
    .increment(1);

    histogram!(format!("{}_tree_build_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_tree_nodes", METRICS_PREFIX)).record(node_count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, UPSTREAM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/v1/paper");
        metrics.finish(200);
        record_resolution(ResolutionSource::Cache);
        record_upstream(0.2, "fetch", false);
        record_tree_build(1.5, 12, 2);
        // Just verify it runs without panic
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(ResolutionSource::Upstream.as_str(), "upstream");
        assert_eq!(ResolutionSource::Omitted.as_str(), "omitted");
    }
}
