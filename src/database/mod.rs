//! Instrumented database access.
//!
//! [`Database`] composes the pool with a [`ConnectionMonitor`] and adds
//! statement timing, slow-query warnings, error logging, a transaction helper
//! and a health check. Errors are logged and returned unchanged.

mod health;
mod transaction;

pub use health::{HealthReport, HealthStatus};
pub use transaction::{OperationContext, Transaction, TransactionState};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DatabaseError;
use crate::metrics::QueryMetrics;
use crate::monitor::{ConnectionMonitor, PoolStats};
use crate::pool::{Connector, DbConnection, Pool, PoolOptions, RowOf, SqlParam};

/// Statements slower than this are logged as slow by default
pub const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(1000);

/// Maximum characters of a statement included in slow-query logs
const STATEMENT_PREVIEW_CHARS: usize = 100;

/// Pool plus instrumentation. Cloning is cheap and shares both.
pub struct Database<C: Connector> {
    pool: Pool<C>,
    monitor: Arc<ConnectionMonitor>,
    slow_query_threshold: Duration,
}

impl<C: Connector> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            monitor: self.monitor.clone(),
            slow_query_threshold: self.slow_query_threshold,
        }
    }
}

impl<C: Connector> Database<C> {
    /// Create the pool and subscribe a fresh monitor to it.
    pub fn new(connector: C, options: PoolOptions) -> Result<Self, DatabaseError> {
        let pool = Pool::new(connector, options)?;
        let monitor = Arc::new(ConnectionMonitor::new());
        pool.subscribe(monitor.clone());

        Ok(Self {
            pool,
            monitor,
            slow_query_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
        })
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
    }

    /// Verify connectivity at startup and report the server clock.
    ///
    /// A failure here is fatal to startup; it is logged and returned.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        let result: Result<(), DatabaseError> = async {
            let mut conn = self.pool.acquire().await?;
            tracing::info!("PostgreSQL database connected successfully");

            let now = conn.server_time().await?;
            tracing::info!(database_time = %now, "Database time");

            self.log_stats();
            conn.release();
            Ok(())
        }
        .await;

        if let Err(ref e) = result {
            tracing::error!(error = %e, "Database connection failed");
        }
        result
    }

    /// Run one statement on a pooled connection.
    ///
    /// The measured duration includes the wait for a free connection.
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<RowOf<C>>, DatabaseError> {
        let start = Instant::now();
        let result = match self.pool.acquire().await {
            Ok(mut conn) => conn.query(sql, params).await,
            Err(e) => Err(e),
        };
        self.record_statement(start, sql, params, result)
    }

    /// Run one statement with logging, on `conn` when given.
    ///
    /// A supplied connection is only borrowed; its owner keeps responsibility
    /// for releasing it.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[SqlParam],
        conn: Option<&mut C::Connection>,
    ) -> Result<Vec<RowOf<C>>, DatabaseError> {
        tracing::debug!(sql = %sql, params = ?params, "Executing SQL");

        match conn {
            Some(conn) => self.run_timed(conn, sql, params).await,
            None => self.query(sql, params).await,
        }
    }

    /// Execute and time a statement on a connection the caller holds.
    pub(crate) async fn run_timed(
        &self,
        conn: &mut C::Connection,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Vec<RowOf<C>>, DatabaseError> {
        let start = Instant::now();
        let result = conn.query(sql, params).await;
        self.record_statement(start, sql, params, result)
    }

    /// Record duration and outcome of a statement started at `start`. Failures
    /// are logged once here; slow statements get a warning.
    fn record_statement(
        &self,
        start: Instant,
        sql: &str,
        params: &[SqlParam],
        result: Result<Vec<RowOf<C>>, DatabaseError>,
    ) -> Result<Vec<RowOf<C>>, DatabaseError> {
        let elapsed = start.elapsed();

        QueryMetrics::record_duration(elapsed);
        if let Err(ref e) = result {
            QueryMetrics::record_error();
            tracing::error!(error = %e, sql = %sql, params = ?params, "Database error");
        }

        if elapsed > self.slow_query_threshold {
            self.monitor.record_slow_query();
            tracing::warn!(
                duration_ms = elapsed.as_millis() as u64,
                query = %statement_preview(sql),
                "Slow query detected"
            );
        }

        result
    }

    /// Live pool gauges merged with cumulative counters.
    pub fn stats(&self) -> PoolStats {
        self.monitor.stats(self.pool.snapshot())
    }

    pub fn log_stats(&self) {
        self.monitor.log_stats(&self.stats());
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Statement shortened to at most [`STATEMENT_PREVIEW_CHARS`] characters,
/// ellipsis included.
pub fn statement_preview(sql: &str) -> String {
    let sql = sql.trim();
    if sql.chars().count() <= STATEMENT_PREVIEW_CHARS {
        return sql.to_string();
    }
    let end = sql
        .char_indices()
        .nth(STATEMENT_PREVIEW_CHARS - 3)
        .map(|(end, _)| end)
        .unwrap_or(sql.len());
    format!("{}...", &sql[..end])
}
