//! Health check and statistics endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::database::HealthReport;
use crate::monitor::PoolStats;
use crate::pool::Connector;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub database: String,
    pub slow_query_threshold_ms: u64,
    pub pool: PoolStats,
}

/// GET /health - 200 when the database answers, 503 otherwise
pub async fn health<C: Connector>(State(state): State<AppState<C>>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.db.health_check().await;
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            report,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    )
}

/// GET /stats - pool gauges and lifecycle counters
pub async fn stats<C: Connector>(State(state): State<AppState<C>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        database: state.settings.database.display_target(),
        slow_query_threshold_ms: state.db.slow_query_threshold().as_millis() as u64,
        pool: state.db.stats(),
    })
}
