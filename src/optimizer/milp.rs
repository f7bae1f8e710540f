#![cfg(feature = "optimization")]
//! MILP battery/load scheduler using good_lp (CBC backend).
//!
//! Decision variables per slot: charge, discharge (continuous, bounded by
//! inverter rate), is_charging (binary, enforces charge/discharge mutual
//! exclusivity), grid_import, grid_export, soc, self_consumed. Slack
//! variables relax the safety envelope, storm reserve, and the soft
//! evening/morning SOC targets so the problem always stays feasible.

use anyhow::Result;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel};

use crate::config::AppConfig;

use super::types::{OptimisationPlan, PlanMetrics, PlanSlot, PlanStatus, SolverInputs, TriggerReason};
use crate::domain::{Mode, Timestamp};

const ACTIVE_POWER_THRESHOLD_W: f64 = 50.0;

/// Dampens import prices above `threshold_cents`: only `factor` of the excess
/// above the threshold is kept, so a single extreme spike doesn't dominate
/// the objective relative to the rest of the horizon. Export prices are never
/// dampened.
pub fn dampen_price(price_cents: f64, threshold_cents: f64, factor: f64) -> f64 {
    if price_cents <= threshold_cents {
        price_cents
    } else {
        threshold_cents + (price_cents - threshold_cents) * factor
    }
}

pub fn solve(
    config: &AppConfig,
    inputs: &SolverInputs,
    trigger_reason: TriggerReason,
    plan_version: u64,
) -> Result<OptimisationPlan> {
    let start_time = std::time::Instant::now();
    let n = inputs.n_slots();
    anyhow::ensure!(n > 0, "solver requires at least one slot");

    let slot_minutes = config.planning.slot_duration_minutes as f64;
    let slot_hours = slot_minutes / 60.0;
    let cap = config.battery.capacity.as_watt_hours();
    let eff = config.battery.round_trip_efficiency.sqrt();

    let arb = &config.arbitrage;
    let dampened_import: Vec<f64> = inputs
        .import_rate_cents
        .iter()
        .map(|&p| dampen_price(p, arb.price_dampen_threshold_cents, arb.price_dampen_factor))
        .collect();

    let mut vars = ProblemVariables::new();
    let max_charge = config.battery.max_charge_rate_w;
    let max_discharge = config.battery.max_discharge_rate_w;
    let max_grid = max_charge + max_discharge;

    let charge = vars.add_vector(variable().min(0.0).max(max_charge), n);
    let discharge = vars.add_vector(variable().min(0.0).max(max_discharge), n);
    let is_charging = vars.add_vector(variable().binary(), n);
    let grid_import = vars.add_vector(variable().min(0.0).max(max_grid), n);
    let grid_export = vars.add_vector(variable().min(0.0).max(max_grid), n);
    let soc = vars.add_vector(variable().min(0.0).max(1.0), n);
    let self_consumed = vars.add_vector(variable().min(0.0), n);
    let safety_slack = vars.add_vector(variable().min(0.0), n);

    let storm_slack = if inputs.storm_active { vars.add_vector(variable().min(0.0), n) } else { Vec::new() };

    let planner_tz: chrono_tz::Tz = config.load_profile.timezone.parse().unwrap_or(chrono_tz::UTC);
    let evening_hour = config.battery_targets.evening_target_hour;
    let morning_hour = config.battery_targets.morning_minimum_hour;
    let mut evening_slot: Option<usize> = None;
    let mut morning_slot: Option<usize> = None;
    for t in 0..n {
        let local = inputs.slot_start_times[t].inner().with_timezone(&planner_tz);
        use chrono::Timelike;
        if local.hour() == evening_hour && evening_slot.is_none() {
            evening_slot = Some(t);
        }
        if local.hour() == morning_hour && morning_slot.is_none() {
            morning_slot = Some(t);
        }
    }
    let evening_slack = vars.add(variable().min(0.0));
    let morning_slack = vars.add(variable().min(0.0));

    let w_safety = 1e6;
    let w_storm = 1e4;
    let w_evening = 1.0;
    let w_morning = 1.0;
    let w_self_consume = 0.5;

    let mut objective = Expression::from(0.0);
    for t in 0..n {
        objective += dampened_import[t] * slot_hours * grid_import[t];
        objective += config.fixed_costs.hedging_per_kwh_cents * slot_hours * grid_import[t];
        objective -= inputs.export_rate_cents[t] * slot_hours * grid_export[t];
        objective -= w_self_consume * slot_hours * self_consumed[t];
        objective += w_safety * safety_slack[t];
    }
    for &s in &storm_slack {
        objective += w_storm * s;
    }
    if evening_slot.is_some() {
        objective += w_evening * evening_slack;
    }
    if morning_slot.is_some() {
        objective += w_morning * morning_slack;
    }

    let mut model = vars.minimise(objective).using(good_lp::default_solver);

    for t in 0..n {
        let soc_prev: Expression = if t == 0 { Expression::from(inputs.current_soc) } else { soc[t - 1].into() };
        model = model.with(constraint!(
            soc[t] == soc_prev + (charge[t] * slot_hours * eff) / cap - (discharge[t] * slot_hours) / (eff * cap)
        ));

        model = model.with(constraint!(soc[t] >= config.battery.soc_min_hard - safety_slack[t]));
        model = model.with(constraint!(soc[t] <= config.battery.soc_max_hard + safety_slack[t]));

        model = model.with(constraint!(charge[t] <= max_charge * is_charging[t]));
        model = model.with(constraint!(discharge[t] <= max_discharge * (1.0 - is_charging[t])));

        let solar = inputs.solar_forecast_w[t];
        let load = inputs.load_forecast_w[t];
        model = model.with(constraint!(
            solar + grid_import[t] + discharge[t] == load + grid_export[t] + charge[t] + (solar - self_consumed[t])
        ));
        model = model.with(constraint!(self_consumed[t] <= solar));
        model = model.with(constraint!(self_consumed[t] <= load));

        if inputs.export_rate_cents[t] < inputs.wacb_cents + arb.break_even_delta_cents {
            model = model.with(constraint!(grid_export[t] == 0.0));
        }

        if inputs.is_spike[t] {
            model = model.with(constraint!(charge[t] == 0.0));
        }

        if inputs.storm_active {
            model = model.with(constraint!(soc[t] >= inputs.storm_reserve_soc - storm_slack[t]));
        }

        if evening_slot == Some(t) {
            model = model.with(constraint!(soc[t] >= config.battery_targets.evening_soc_target - evening_slack));
        }
        if morning_slot == Some(t) {
            model = model.with(constraint!(soc[t] >= config.battery_targets.morning_soc_minimum - morning_slack));
        }
    }

    // A non-optimal termination (infeasible proof, timeout) never drops the
    // plan: the incumbent is approximated by holding SOC flat and leaving
    // every slot on SELF_USE, flagged so callers can see the degraded status
    // rather than silently keeping a stale plan.
    let (solution, status) = match model.solve() {
        Ok(solution) => (Some(solution), PlanStatus::Optimal),
        Err(e) => {
            let message = e.to_string();
            let status = if message.to_lowercase().contains("infeasible") {
                PlanStatus::SolverInfeasible
            } else {
                PlanStatus::SolverTimeout
            };
            tracing::warn!(error = %message, status = %status, "MILP solver did not reach optimality, adopting self-use incumbent");
            (None, status)
        }
    };
    let solver_time_ms = start_time.elapsed().as_millis() as u64;

    let now = Timestamp::now();
    let horizon_start = inputs.slot_start_times[0];
    let horizon_end = horizon_start.add(crate::domain::Duration::minutes((slot_minutes as i64) * n as i64));

    let mut active_constraints = Vec::new();
    if inputs.storm_active {
        active_constraints.push("storm_reserve".to_string());
    }
    if status != PlanStatus::Optimal {
        active_constraints.push("solver_fallback".to_string());
    }

    let mut slots = Vec::with_capacity(n);
    let mut objective_score = 0.0;
    for t in 0..n {
        let (charge_val, discharge_val, soc_val, export_val, import_val) = match &solution {
            Some(solution) => (
                solution.value(charge[t]),
                solution.value(discharge[t]),
                solution.value(soc[t]),
                solution.value(grid_export[t]),
                solution.value(grid_import[t]),
            ),
            None => (0.0, 0.0, inputs.current_soc, 0.0, 0.0),
        };

        let mode = if solution.is_some() {
            determine_mode(charge_val, discharge_val, export_val, inputs.is_spike[t])
        } else {
            Mode::SelfUse
        };
        let power = if mode == Mode::ForceCharge { charge_val.abs() } else { discharge_val.abs() };

        let slot_start = horizon_start.add(crate::domain::Duration::minutes((t as i64) * slot_minutes as i64));
        let slot_end = slot_start.add(crate::domain::Duration::minutes(slot_minutes as i64));

        let mut flags = Vec::new();
        if inputs.is_spike[t] {
            flags.push("spike".to_string());
        }
        if inputs.storm_active {
            flags.push("storm_reserve".to_string());
        }
        if solution.is_none() {
            flags.push("solver_fallback".to_string());
        }

        objective_score += dampened_import[t] * slot_hours * import_val;
        objective_score -= inputs.export_rate_cents[t] * slot_hours * export_val;

        slots.push(PlanSlot {
            index: t,
            start: slot_start,
            end: slot_end,
            mode,
            target_power_w: power,
            expected_soc: (soc_val * 10_000.0).round() / 10_000.0,
            import_rate_cents: inputs.import_rate_cents[t],
            export_rate_cents: inputs.export_rate_cents[t],
            solar_forecast_w: inputs.solar_forecast_w[t],
            load_forecast_w: inputs.load_forecast_w[t],
            scheduled_loads: Vec::new(),
            constraint_flags: flags,
        });
    }

    tracing::info!(
        objective = objective_score,
        solver_time_ms,
        slots = n,
        status = %status,
        "MILP solve complete"
    );

    Ok(OptimisationPlan {
        version: plan_version,
        created_at: now,
        trigger_reason,
        horizon_start,
        horizon_end,
        slots,
        objective_score: (objective_score * 100.0).round() / 100.0,
        solver_time_ms,
        active_constraints,
        metrics: PlanMetrics {
            status,
            n_slots: n,
            current_soc: inputs.current_soc,
            wacb_cents: inputs.wacb_cents,
            storm_active: inputs.storm_active,
        },
    })
}

/// Discharge that reaches the grid (export > threshold) is `FORCE_DISCHARGE`
/// -- the inverter must actively push power out. Discharge that only serves
/// local load is left to the inverter's own `SELF_USE` behaviour.
fn determine_mode(charge_w: f64, discharge_w: f64, grid_export_w: f64, is_spike: bool) -> Mode {
    if charge_w > ACTIVE_POWER_THRESHOLD_W {
        Mode::ForceCharge
    } else if discharge_w > ACTIVE_POWER_THRESHOLD_W && grid_export_w > ACTIVE_POWER_THRESHOLD_W {
        Mode::ForceDischarge
    } else if is_spike {
        Mode::SelfUse
    } else {
        Mode::SelfUse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HORIZON_START_UNIX: i64 = 1_704_844_800; // 2024-01-10 10:00 Australia/Brisbane

    fn inputs(import: [f64; 8], export: [f64; 8], load_w: f64, current_soc: f64, wacb_cents: f64) -> SolverInputs {
        let start = Timestamp::from_unix(HORIZON_START_UNIX).unwrap();
        let slot_start_times = (0..8i64).map(|t| start.add(crate::domain::Duration::minutes(30 * t))).collect();

        SolverInputs {
            solar_forecast_w: vec![0.0; 8],
            load_forecast_w: vec![load_w; 8],
            import_rate_cents: import.to_vec(),
            export_rate_cents: export.to_vec(),
            is_spike: vec![false; 8],
            slot_start_times,
            current_soc,
            wacb_cents,
            storm_active: false,
            storm_reserve_soc: 0.0,
        }
    }

    #[test]
    fn cheap_then_expensive_charge() {
        let config = AppConfig::test_default();
        let import = [1.0, 1.0, 1.0, 1.0, 100.0, 100.0, 100.0, 100.0];
        let export = [0.0; 8];
        let solver_inputs = inputs(import, export, 3000.0, 0.10, 5.0);

        let plan = solve(&config, &solver_inputs, TriggerReason::Initial, 1).unwrap();

        let max_soc = plan.slots.iter().map(|s| s.expected_soc).fold(f64::MIN, f64::max);
        assert!(max_soc > 0.10, "battery never charged above its starting SOC: {max_soc}");

        assert!(
            plan.slots[0..4].iter().any(|s| s.mode == Mode::ForceCharge),
            "expected at least one FORCE_CHARGE slot among the cheap slots"
        );
        assert!(
            !plan.slots[4..8].iter().any(|s| s.mode == Mode::ForceCharge),
            "expensive slots should never charge the battery"
        );
    }

    #[test]
    fn profitable_arbitrage_allows_export() {
        let config = AppConfig::test_default();
        let import = [50.0; 8];
        let export = [25.0; 8];
        let solver_inputs = inputs(import, export, 200.0, 0.80, 10.0);

        let plan = solve(&config, &solver_inputs, TriggerReason::Initial, 1).unwrap();

        assert!(
            plan.slots.iter().any(|s| s.mode == Mode::ForceDischarge),
            "expected at least one FORCE_DISCHARGE (export) slot when export clears the break-even gate"
        );
    }

    #[test]
    fn unprofitable_export_blocked() {
        let config = AppConfig::test_default();
        let import = [50.0; 8];
        let export = [12.0; 8];
        let solver_inputs = inputs(import, export, 200.0, 0.80, 10.0);

        let plan = solve(&config, &solver_inputs, TriggerReason::Initial, 1).unwrap();

        assert!(
            plan.slots.iter().all(|s| s.mode != Mode::ForceDischarge),
            "export below wacb + break-even delta must never be scheduled"
        );
    }
}
