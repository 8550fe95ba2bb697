use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::api::api_routes;
use crate::pool::Connector;

use super::AppState;

pub fn create_app<C: Connector>(state: AppState<C>) -> Router {
    Router::new()
        .merge(api_routes::<C>())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
