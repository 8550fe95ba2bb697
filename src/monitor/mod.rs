//! Connection pool monitoring.
//!
//! [`ConnectionMonitor`] observes the pool through its lifecycle
//! notifications and never alters pool behavior. One monitor is created per
//! pool and shared via `Arc` with whatever issues queries.

mod stats;

pub use stats::{ConnectionCounters, PoolStats};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::{PoolMetrics, QueryMetrics, TransactionMetrics};
use crate::pool::{PoolEvent, PoolListener, PoolSnapshot};

/// Lock-free lifecycle counters for one pool
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    removed: AtomicU64,
    errors: AtomicU64,
    slow_queries: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_create(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_query(&self) {
        self.slow_queries.fetch_add(1, Ordering::Relaxed);
        QueryMetrics::record_slow();
    }

    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
        TransactionMetrics::record_committed();
    }

    pub fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
        TransactionMetrics::record_rolled_back();
    }

    pub fn counters(&self) -> ConnectionCounters {
        ConnectionCounters {
            created: self.created.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
        }
    }

    /// Merge a live pool snapshot with the cumulative counters.
    pub fn stats(&self, snapshot: PoolSnapshot) -> PoolStats {
        PoolMetrics::set_snapshot(&snapshot);
        PoolStats::from_parts(snapshot, self.counters())
    }

    pub fn log_stats(&self, stats: &PoolStats) {
        tracing::info!(
            active = %format!("{}/{}", stats.active, stats.max),
            idle = stats.idle,
            waiting = stats.waiting,
            usage = %format!("{:.1}%", stats.usage_percent()),
            "Database connection stats"
        );
    }
}

impl PoolListener for ConnectionMonitor {
    fn on_event(&self, event: &PoolEvent) {
        PoolMetrics::record_event(event);

        match event {
            PoolEvent::Connect => {
                self.record_create();
                tracing::debug!("New database connection created");
            }
            PoolEvent::Acquire => self.record_acquire(),
            PoolEvent::Release => self.record_release(),
            PoolEvent::Remove => {
                self.record_remove();
                tracing::debug!("Database connection removed");
            }
            PoolEvent::Error(message) => {
                self.record_error();
                tracing::error!(error = %message, "Unexpected error on idle database connection");
            }
        }
    }
}
