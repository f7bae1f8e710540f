use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    resilience_level: String,
    last_tick_age_seconds: Option<i64>,
    tick_count: u64,
}

/// GET /healthz -- resilience level and last-tick age, for process
/// supervision. Never touches the inverter directly; reads the coordinator's
/// already-maintained state.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.status();
    let status = match snapshot.resilience_level.as_str() {
        "normal" => "healthy",
        "offline" | "degraded_hardware" | "safe_mode" => "unhealthy",
        _ => "degraded",
    };
    let code = if status == "unhealthy" { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };

    let body = HealthResponse {
        status: status.to_string(),
        resilience_level: snapshot.resilience_level,
        last_tick_age_seconds: snapshot.last_telemetry_age_seconds,
        tick_count: snapshot.tick_count,
    };

    (code, Json(body))
}
