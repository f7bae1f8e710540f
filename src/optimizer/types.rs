use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::{Mode, Timestamp};

/// Why a plan rebuild was triggered. First-match-wins in the rebuild evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerReason {
    Initial,
    PriceSpike,
    Storm,
    SocDeviation,
    Periodic,
    ForecastDelta,
}

/// A single planning-horizon slot (30 minutes) in a solved plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSlot {
    pub index: usize,
    pub start: Timestamp,
    pub end: Timestamp,
    pub mode: Mode,
    pub target_power_w: f64,
    pub expected_soc: f64,
    pub import_rate_cents: f64,
    pub export_rate_cents: f64,
    pub solar_forecast_w: f64,
    pub load_forecast_w: f64,
    pub scheduled_loads: Vec<String>,
    pub constraint_flags: Vec<String>,
}

/// Solver termination status, carried on the plan so a degraded solve is
/// still adopted rather than silently discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanStatus {
    Optimal,
    SolverInfeasible,
    SolverTimeout,
}

/// Summary numbers callers inspect without walking every slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub status: PlanStatus,
    pub n_slots: usize,
    pub current_soc: f64,
    pub wacb_cents: f64,
    pub storm_active: bool,
}

/// A complete solved plan covering the planning horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisationPlan {
    pub version: u64,
    pub created_at: Timestamp,
    pub trigger_reason: TriggerReason,
    pub horizon_start: Timestamp,
    pub horizon_end: Timestamp,
    pub slots: Vec<PlanSlot>,
    pub objective_score: f64,
    pub solver_time_ms: u64,
    pub active_constraints: Vec<String>,
    pub metrics: PlanMetrics,
}

impl OptimisationPlan {
    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_at(&self, t: Timestamp) -> Option<&PlanSlot> {
        self.slots.iter().find(|s| s.start.inner() <= t.inner() && t.inner() < s.end.inner())
    }

    pub fn current_slot(&self) -> Option<&PlanSlot> {
        self.slot_at(Timestamp::now())
    }
}

/// Per-slot arrays and current state fed to the MILP solver for one run.
#[derive(Debug, Clone)]
pub struct SolverInputs {
    pub solar_forecast_w: Vec<f64>,
    pub load_forecast_w: Vec<f64>,
    pub import_rate_cents: Vec<f64>,
    pub export_rate_cents: Vec<f64>,
    pub is_spike: Vec<bool>,
    pub slot_start_times: Vec<Timestamp>,
    pub current_soc: f64,
    pub wacb_cents: f64,
    pub storm_active: bool,
    pub storm_reserve_soc: f64,
}

impl SolverInputs {
    pub fn n_slots(&self) -> usize {
        self.solar_forecast_w.len()
    }
}
