//! Graceful shutdown handling.
//!
//! On SIGINT or SIGTERM the server stops accepting requests, background
//! tasks are signalled, final pool statistics are logged and the pool is
//! closed once every checked-out connection has been returned. Connections
//! still out after the warning period are reported, and the wait goes on.

use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::database::Database;
use crate::monitor::PoolStats;
use crate::pool::Connector;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Wait this long for checked-out connections before warning (default: 10 seconds)
    pub pool_close_warn_after: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            pool_close_warn_after: Duration::from_secs(10),
        }
    }
}

/// Closes the database side of the process in order
pub struct GracefulShutdown<C: Connector> {
    db: Database<C>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl<C: Connector> GracefulShutdown<C> {
    pub fn new(db: Database<C>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(db, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(db: Database<C>, shutdown_tx: broadcast::Sender<()>, config: ShutdownConfig) -> Self {
        Self {
            db,
            shutdown_tx,
            config,
        }
    }

    /// Execute the shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = tokio::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Shutting down database pool");
        let _ = self.shutdown_tx.send(());

        let stats = self.db.stats();
        tracing::info!("Final pool statistics");
        self.db.log_stats();
        result.final_stats = Some(stats);

        let close = self.db.close();
        tokio::pin!(close);
        if timeout(self.config.pool_close_warn_after, &mut close).await.is_err() {
            result.close_overran = true;
            tracing::warn!(
                checked_out = self.db.pool().size(),
                waited_ms = self.config.pool_close_warn_after.as_millis() as u64,
                "Still waiting for connections to be returned"
            );
            close.await;
        }
        result.pool_closed = true;
        tracing::info!("Database pool closed");

        result.duration = start.elapsed();
        result.success = result.pool_closed;
        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Whether every connection was returned and closed
    pub pool_closed: bool,
    /// Connections were still checked out when the warning period ended
    pub close_overran: bool,
    /// Pool statistics captured before closing
    pub final_stats: Option<PoolStats>,
    pub duration: Duration,
}

/// Resolve on Ctrl+C or SIGTERM. Returns the name of the signal.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
            "SIGINT"
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            "SIGTERM"
        }
    }
}
