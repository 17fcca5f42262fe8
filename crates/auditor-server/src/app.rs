use axum::middleware;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::handlers::{
    ask::ask_handler, health::health, metrics::metrics_handler, retrieve::retrieve_handler,
    schemas::schemas_handler,
};
use crate::middleware::trace_with_correlation;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/schemas", get(schemas_handler))
        .route("/retrieve", post(retrieve_handler))
        .route("/ask", post(ask_handler))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(trace_with_correlation))
        .with_state(state)
}
