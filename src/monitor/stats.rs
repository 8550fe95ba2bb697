//! Pool statistics structures

use serde::Serialize;

use crate::pool::PoolSnapshot;

/// Cumulative counters, monotonic for the lifetime of the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionCounters {
    pub created: u64,
    pub acquired: u64,
    pub released: u64,
    pub removed: u64,
    pub errors: u64,
    pub slow_queries: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

/// Pool gauges merged with cumulative counters.
///
/// `active` is always `total - idle` of the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
    pub max: u32,
    pub usage: String,
    pub stats: ConnectionCounters,
}

impl PoolStats {
    pub fn from_parts(snapshot: PoolSnapshot, counters: ConnectionCounters) -> Self {
        let idle = snapshot.idle.min(snapshot.total);
        let active = snapshot.total - idle;
        Self {
            total: snapshot.total,
            active,
            idle,
            waiting: snapshot.waiting,
            max: snapshot.max,
            usage: format!("{}/{}", active, snapshot.max),
            stats: counters,
        }
    }

    /// Share of the pool ceiling in use, 0.0 to 100.0
    pub fn usage_percent(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.active as f64 / self.max as f64 * 100.0
    }
}
