pub mod health;
pub mod status;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;

pub type AppState = Arc<Coordinator>;

/// The ambient HTTP surface: process supervision plumbing so the crate
/// remains runnable and inspectable as a binary. Not the dashboard -- that
/// stays out of scope.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::health_check))
        .route("/status", get(status::status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
