//! Prometheus metrics for the database layer.
//!
//! - Pool gauges (open, active, idle, waiting connections)
//! - Pool lifecycle counters (created, acquired, released, removed, errors)
//! - Query latency and slow-query counts
//! - Transaction outcomes

mod helpers;

pub use helpers::{encode_metrics, PoolMetrics, QueryMetrics, TransactionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "kitchen_db";

lazy_static! {
    // ============================================================================
    // Pool Metrics
    // ============================================================================

    /// Connections by state (total, active, idle, waiting)
    pub static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_pool_connections", METRIC_PREFIX),
        "Database pool connections by state",
        &["state"]
    ).unwrap();

    /// Pool lifecycle events (connect, acquire, release, remove, error)
    pub static ref POOL_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_pool_events_total", METRIC_PREFIX),
        "Total database pool lifecycle events",
        &["event"]
    ).unwrap();

    // ============================================================================
    // Query Metrics
    // ============================================================================

    /// Statement execution latency
    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        format!("{}_query_duration_seconds", METRIC_PREFIX),
        "Statement execution time in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Statements slower than the configured threshold
    pub static ref SLOW_QUERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_slow_queries_total", METRIC_PREFIX),
        "Total statements exceeding the slow-query threshold"
    ).unwrap();

    /// Failed statements
    pub static ref QUERY_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_query_errors_total", METRIC_PREFIX),
        "Total statements that returned an error"
    ).unwrap();

    // ============================================================================
    // Transaction Metrics
    // ============================================================================

    /// Transactions by outcome (committed, rolled_back, rollback_failed)
    pub static ref TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_transactions_total", METRIC_PREFIX),
        "Total transactions by outcome",
        &["outcome"]
    ).unwrap();
}
