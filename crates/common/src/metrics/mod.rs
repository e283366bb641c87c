//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned histograms and standardized naming.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Friendlink metrics
pub const METRICS_PREFIX: &str = "friendlink";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 25ms, P99 < 100ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms - P50 target
    0.050,  // 50ms
    0.075,  // 75ms
    0.100,  // 100ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
];

/// Buckets for decay cycles (full keyspace scans)
pub const DECAY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        Unit::Count,
        "Recommendation queries served"
    );

    describe_histogram!(
        format!("{}_recommendation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Recommendation query latency in seconds"
    );

    describe_counter!(
        format!("{}_recommended_members_total", METRICS_PREFIX),
        Unit::Count,
        "Members returned, labelled by graph depth (0 = fallback)"
    );

    describe_gauge!(
        format!("{}_recommendation_pool_size", METRICS_PREFIX),
        Unit::Count,
        "Ranked candidate pool size of the last query"
    );

    describe_counter!(
        format!("{}_recommendation_degraded_total", METRICS_PREFIX),
        Unit::Count,
        "Store failures absorbed by the recommendation engine, by stage"
    );

    describe_counter!(
        format!("{}_decay_cycles_total", METRICS_PREFIX),
        Unit::Count,
        "Interaction decay cycles by status"
    );

    describe_histogram!(
        format!("{}_decay_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Interaction decay cycle duration"
    );

    describe_gauge!(
        format!("{}_decay_processed_keys", METRICS_PREFIX),
        Unit::Count,
        "Score collections processed by the last decay cycle"
    );

    describe_counter!(
        format!("{}_graph_events_total", METRICS_PREFIX),
        Unit::Count,
        "Graph events consumed, by kind and outcome"
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

/// Helper to record one served recommendation page.
/// `served_by_depth` holds counts for depth 0 (fallback), 2 and 3.
pub fn record_recommendation(duration_secs: f64, pool_size: usize, served_by_depth: [(u8, usize); 3]) {
    counter!(format!("{}_recommendations_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_recommendation_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_recommendation_pool_size", METRICS_PREFIX)).set(pool_size as f64);

    for (depth, count) in served_by_depth {
        if count > 0 {
            counter!(
                format!("{}_recommended_members_total", METRICS_PREFIX),
                "depth" => depth.to_string()
            )
            .increment(count as u64);
        }
    }
}

/// Helper to record a store failure the engine degraded around
pub fn record_degradation(stage: &'static str) {
    counter!(
        format!("{}_recommendation_degraded_total", METRICS_PREFIX),
        "stage" => stage
    )
    .increment(1);
}

/// Helper to record a decay cycle; `processed` is None when the cycle failed
pub fn record_decay(duration_secs: f64, processed: Option<usize>) {
    let status = if processed.is_some() { "success" } else { "error" };

    counter!(
        format!("{}_decay_cycles_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_decay_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if let Some(keys) = processed {
        gauge!(format!("{}_decay_processed_keys", METRICS_PREFIX)).set(keys as f64);
    }
}

/// Helper to record a consumed graph event
pub fn record_graph_event(kind: &'static str, outcome: &'static str) {
    counter!(
        format!("{}_graph_events_total", METRICS_PREFIX),
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.025));
        assert!(LATENCY_BUCKETS.contains(&0.100));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper must be a no-op
        let metrics = RequestMetrics::start("GET", "/v1/members/1/recommendations");
        metrics.finish(200);
        record_recommendation(0.01, 4, [(0, 1), (2, 3), (3, 0)]);
        record_degradation("scores");
        record_decay(0.2, Some(10));
        record_graph_event("interaction", "duplicate");
    }
}
