//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::pool::{PoolEvent, PoolSnapshot};

use super::{
    POOL_CONNECTIONS, POOL_EVENTS_TOTAL, QUERY_DURATION, QUERY_ERRORS_TOTAL, SLOW_QUERIES_TOTAL,
    TRANSACTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording pool metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record a lifecycle event
    pub fn record_event(event: &PoolEvent) {
        POOL_EVENTS_TOTAL.with_label_values(&[event.as_str()]).inc();
    }

    /// Publish sampled gauges
    pub fn set_snapshot(snapshot: &PoolSnapshot) {
        let active = snapshot.total.saturating_sub(snapshot.idle);
        POOL_CONNECTIONS.with_label_values(&["total"]).set(snapshot.total as i64);
        POOL_CONNECTIONS.with_label_values(&["active"]).set(active as i64);
        POOL_CONNECTIONS.with_label_values(&["idle"]).set(snapshot.idle as i64);
        POOL_CONNECTIONS.with_label_values(&["waiting"]).set(snapshot.waiting as i64);
    }
}

/// Helper struct for recording statement metrics
pub struct QueryMetrics;

impl QueryMetrics {
    pub fn record_duration(elapsed: Duration) {
        QUERY_DURATION.observe(elapsed.as_secs_f64());
    }

    pub fn record_slow() {
        SLOW_QUERIES_TOTAL.inc();
    }

    pub fn record_error() {
        QUERY_ERRORS_TOTAL.inc();
    }
}

/// Helper struct for recording transaction outcomes
pub struct TransactionMetrics;

impl TransactionMetrics {
    pub fn record_committed() {
        TRANSACTIONS_TOTAL.with_label_values(&["committed"]).inc();
    }

    pub fn record_rolled_back() {
        TRANSACTIONS_TOTAL.with_label_values(&["rolled_back"]).inc();
    }

    pub fn record_rollback_failed() {
        TRANSACTIONS_TOTAL.with_label_values(&["rollback_failed"]).inc();
    }
}
