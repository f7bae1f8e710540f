//! Second-pass deferrable-load scheduler.
//!
//! Runs after the MILP solve completes and assigns each configured
//! deferrable load to the best contiguous run of plan slots, preferring
//! excess solar and cheap import slots, and respecting day/time windows.

use std::collections::BTreeMap;

use chrono::{Datelike, Timelike};

use crate::config::LoadConfig;

use super::types::OptimisationPlan;

/// A load assigned into specific plan slot indices.
#[derive(Debug, Clone)]
pub struct ScheduledLoad {
    pub load_id: String,
    pub name: String,
    pub power_w: f64,
    pub priority_class: u8,
    pub assigned_slots: Vec<usize>,
    pub prefer_solar: bool,
}

/// Assigns deferrable loads to optimal plan slots. `actual_runtime_minutes`
/// credits runtime already achieved today against the minimum, keyed by load
/// id. `plan` is mutated in place: each assigned slot's `scheduled_loads`
/// gains the load's name.
pub fn schedule_loads(
    plan: &mut OptimisationPlan,
    available_loads: &[LoadConfig],
    spike_active: bool,
    actual_runtime_minutes: &BTreeMap<String, f64>,
) -> Vec<ScheduledLoad> {
    let mut scheduled = Vec::new();
    let slot_minutes = slot_duration_minutes(plan);

    let mut sorted_loads: Vec<&LoadConfig> = available_loads.iter().collect();
    sorted_loads.sort_by_key(|l| l.priority_class);

    for load in sorted_loads {
        if spike_active && load.priority_class > 2 {
            tracing::info!(load = %load.name, priority = load.priority_class, "deferring load due to price spike");
            continue;
        }
        if !load.enabled {
            continue;
        }

        let mut runtime_minutes = effective_runtime_minutes(load);
        if let Some(&actual) = actual_runtime_minutes.get(&load.id) {
            if actual > 0.0 {
                runtime_minutes = (runtime_minutes - actual as i64).max(0);
                if runtime_minutes <= 0 {
                    tracing::info!(load = %load.name, actual, "load already satisfied minimum runtime");
                    continue;
                }
            }
        }

        let duration_slots = ((runtime_minutes as f64 / slot_minutes as f64).ceil() as usize).max(1);

        let eligible = find_eligible_slots(plan, load);
        if eligible.is_empty() {
            continue;
        }

        let scores: BTreeMap<usize, f64> =
            eligible.iter().map(|&idx| (idx, score_slot(&plan.slots[idx], load.power_w, load.prefer_solar))).collect();

        let mut assigned = Vec::new();
        for day_indices in group_indices_by_local_day(plan, &eligible, load) {
            let mut scored: Vec<(usize, f64)> = day_indices.iter().map(|&idx| (idx, scores[&idx])).collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            assigned.extend(assign_consecutive(&scored, duration_slots));
        }

        if !assigned.is_empty() {
            for &idx in &assigned {
                plan.slots[idx].scheduled_loads.push(load.name.clone());
            }
            scheduled.push(ScheduledLoad {
                load_id: load.id.clone(),
                name: load.name.clone(),
                power_w: load.power_w,
                priority_class: load.priority_class,
                assigned_slots: assigned,
                prefer_solar: load.prefer_solar,
            });
        }
    }

    tracing::info!(count = scheduled.len(), "deferrable loads scheduled");
    scheduled
}

fn slot_duration_minutes(plan: &OptimisationPlan) -> i64 {
    plan.slots
        .first()
        .map(|s| s.end.duration_since(&s.start).as_minutes())
        .filter(|&m| m > 0)
        .unwrap_or(30)
}

/// Runtime is derived from ideal, falling back to min then max, then clamped
/// into `[min_runtime, max_runtime]` when those are set. `duration_minutes`
/// is intentionally not consulted; runtime comes only from the min/ideal/max
/// trio.
fn effective_runtime_minutes(load: &LoadConfig) -> i64 {
    let mut runtime = 60i64;
    if load.ideal_runtime_minutes > 0 {
        runtime = load.ideal_runtime_minutes;
    } else if load.min_runtime_minutes > 0 {
        runtime = load.min_runtime_minutes;
    } else if load.max_runtime_minutes > 0 {
        runtime = load.max_runtime_minutes;
    }

    if load.min_runtime_minutes > 0 {
        runtime = runtime.max(load.min_runtime_minutes);
    }
    if load.max_runtime_minutes > 0 {
        runtime = runtime.min(load.max_runtime_minutes);
    }
    runtime.max(1)
}

fn find_eligible_slots(plan: &OptimisationPlan, load: &LoadConfig) -> Vec<usize> {
    let tz: chrono_tz::Tz = load.timezone.parse().unwrap_or(chrono_tz::UTC);

    plan.slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| {
            let local = slot.start.inner().with_timezone(&tz);
            if !load.days_of_week.contains(&(local.weekday().num_days_from_monday() as u8)) {
                return false;
            }
            let slot_time = local.hour() as i64 * 60 + local.minute() as i64;
            let start_time = load.earliest_start_minute;
            let end_time = load.latest_end_minute;
            if start_time <= end_time {
                start_time <= slot_time && slot_time < end_time
            } else {
                slot_time >= start_time || slot_time < end_time
            }
        })
        .map(|(i, _)| i)
        .collect()
}

fn group_indices_by_local_day(plan: &OptimisationPlan, indices: &[usize], load: &LoadConfig) -> Vec<Vec<usize>> {
    let tz: chrono_tz::Tz = load.timezone.parse().unwrap_or(chrono_tz::UTC);
    let mut by_day: BTreeMap<chrono::NaiveDate, Vec<usize>> = BTreeMap::new();
    for &idx in indices {
        let local = plan.slots[idx].start.inner().with_timezone(&tz);
        by_day.entry(local.date_naive()).or_default().push(idx);
    }
    by_day.into_values().map(|mut v| { v.sort(); v }).collect()
}

/// Lower is better: base cost is the import rate, large bonus for excess
/// solar headroom above the load's own draw, heavy penalty for spike slots.
fn score_slot(slot: &super::types::PlanSlot, power_w: f64, prefer_solar: bool) -> f64 {
    let mut score = slot.import_rate_cents;

    if prefer_solar {
        let excess_solar = slot.solar_forecast_w - slot.load_forecast_w;
        if excess_solar > power_w {
            score -= 50.0;
        }
    }

    if slot.constraint_flags.iter().any(|f| f == "spike") {
        score += 500.0;
    }

    score
}

fn assign_consecutive(scored: &[(usize, f64)], duration_slots: usize) -> Vec<usize> {
    if scored.len() < duration_slots {
        return Vec::new();
    }

    let mut indices: Vec<usize> = scored.iter().map(|(idx, _)| *idx).collect();
    indices.sort();

    let mut best_run: Vec<usize> = Vec::new();
    let mut best_score = f64::INFINITY;

    for start in 0..=(indices.len() - duration_slots) {
        let run = &indices[start..start + duration_slots];
        let consecutive = run.windows(2).all(|w| w[1] - w[0] == 1);
        if !consecutive {
            continue;
        }
        let run_score: f64 = scored.iter().filter(|(idx, _)| run.contains(idx)).map(|(_, s)| s).sum();
        if run_score < best_score {
            best_score = run_score;
            best_run = run.to_vec();
        }
    }

    best_run
}
