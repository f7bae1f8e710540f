use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::accounting::AccountingSummary;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    resilience_level: String,
    tick_count: u64,
    plan_version: Option<u64>,
    accounting: AccountingSummary,
}

/// GET /status -- current plan summary, WACB, and billing totals. Read-only;
/// never mutates the coordinator's state.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.status();
    Json(StatusResponse {
        resilience_level: snapshot.resilience_level,
        tick_count: snapshot.tick_count,
        plan_version: snapshot.plan_version,
        accounting: snapshot.accounting,
    })
}
