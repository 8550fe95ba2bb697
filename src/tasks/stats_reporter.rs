use std::time::Duration;

use tokio::sync::broadcast;

use crate::database::Database;
use crate::pool::Connector;

/// Background task that logs pool statistics at a fixed interval
pub struct StatsReporter<C: Connector> {
    db: Database<C>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl<C: Connector> StatsReporter<C> {
    pub fn new(db: Database<C>, interval: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        Self { db, interval, shutdown }
    }

    /// Run until a shutdown signal arrives or the sender is dropped.
    /// Returns the number of reports written.
    pub async fn run(mut self) -> u64 {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Pool stats reporter started"
        );

        let mut reports = 0;
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Pool stats reporter received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    if self.db.pool().is_closed() {
                        break;
                    }
                    self.db.log_stats();
                    reports += 1;
                }
            }
        }

        tracing::info!(reports = reports, "Pool stats reporter stopped");
        reports
    }
}
