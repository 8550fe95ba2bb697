use axum::{routing::get, Router};

use crate::pool::Connector;
use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes<C: Connector>() -> Router<AppState<C>> {
    Router::new()
        .route("/health", get(health::<C>))
        .route("/stats", get(stats::<C>))
        .route("/metrics", get(prometheus_metrics::<C>))
}
