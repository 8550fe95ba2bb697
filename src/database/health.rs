//! Database health check for liveness endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::monitor::PoolStats;
use crate::pool::Connector;

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// `connected` or `disconnected`
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<PoolStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn healthy(stats: PoolStats) -> Self {
        Self {
            status: HealthStatus::Healthy,
            database: "connected",
            connections: Some(stats),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "Unknown error".to_string();
        }
        Self {
            status: HealthStatus::Unhealthy,
            database: "disconnected",
            connections: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl<C: Connector> Database<C> {
    /// Check the database with `SELECT 1`. Never fails; problems are reported
    /// in the returned [`HealthReport`].
    pub async fn health_check(&self) -> HealthReport {
        let stats = self.stats();
        match self.query("SELECT 1 as health_check", &[]).await {
            Ok(_) => HealthReport::healthy(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                HealthReport::unhealthy(e.to_string())
            }
        }
    }
}
