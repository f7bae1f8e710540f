use thiserror::Error;

use crate::hardware::AdapterError;

/// Composed error taxonomy for the control core. Errors inside a tick are
/// caught and logged at that tick; they never propagate past the control
/// loop (see `control::control_loop`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("permanent configuration error: {0}")]
    PermanentConfig(#[from] anyhow::Error),

    #[error("solver reported infeasible: {0}")]
    SolverInfeasible(String),

    #[error("solver timed out after {0}s")]
    SolverTimeout(u64),

    #[error("telemetry stale, last reading {age_seconds}s old")]
    TelemetryStale { age_seconds: i64 },

    #[error("grid import {actual_w}W exceeds configured maximum {max_w}W")]
    OverloadDetected { actual_w: f64, max_w: f64 },

    #[error("inverter adapter error: {0}")]
    Adapter(#[from] AdapterError),
}
