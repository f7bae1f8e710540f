//! Conditional rebuild evaluator -- decides when a new MILP solve is due.
//!
//! Checked in a fixed, first-match-wins order: no active plan, an active
//! price spike the current plan hasn't already accounted for, a storm state
//! transition, SOC deviation from the plan's expectation, the periodic
//! interval, and finally forecast staleness.

use crate::config::AppConfig;
use crate::domain::Timestamp;
use crate::forecast::ForecastAggregator;

use super::types::{OptimisationPlan, TriggerReason};

#[derive(Debug, Clone)]
pub struct RebuildResult {
    pub should_rebuild: bool,
    pub trigger: Option<TriggerReason>,
    pub reason: String,
}

impl RebuildResult {
    fn no() -> Self {
        Self { should_rebuild: false, trigger: None, reason: String::new() }
    }

    fn yes(trigger: TriggerReason, reason: impl Into<String>) -> Self {
        Self { should_rebuild: true, trigger: Some(trigger), reason: reason.into() }
    }
}

/// Owns `last_storm_state` so storm activation/clearance is detected exactly
/// once per transition rather than re-triggering every tick while active.
pub struct RebuildEvaluator {
    config: AppConfig,
    last_rebuild_at: Option<Timestamp>,
    last_storm_state: bool,
}

impl RebuildEvaluator {
    pub fn new(config: AppConfig) -> Self {
        Self { config, last_rebuild_at: None, last_storm_state: false }
    }

    pub fn evaluate(
        &mut self,
        current_plan: Option<&OptimisationPlan>,
        current_soc: f64,
        aggregator: &ForecastAggregator,
        now: Timestamp,
    ) -> RebuildResult {
        let Some(plan) = current_plan else {
            return RebuildResult::yes(TriggerReason::Initial, "no active plan");
        };

        if aggregator.spike_detector().is_spike_active() && plan.trigger_reason != TriggerReason::PriceSpike {
            return RebuildResult::yes(TriggerReason::PriceSpike, "price spike detected");
        }

        let storm_active = aggregator.state().storm_probability() >= self.config.storm.probability_threshold;
        if storm_active != self.last_storm_state {
            self.last_storm_state = storm_active;
            let state = if storm_active { "activated" } else { "cleared" };
            return RebuildResult::yes(TriggerReason::Storm, format!("storm {state}"));
        }

        if let Some(slot) = plan.slot_at(now) {
            let deviation = (current_soc - slot.expected_soc).abs();
            if deviation > self.config.planning.soc_deviation_tolerance {
                return RebuildResult::yes(
                    TriggerReason::SocDeviation,
                    format!(
                        "SOC deviation {:.1}% (expected {:.1}%, actual {:.1}%)",
                        deviation * 100.0,
                        slot.expected_soc * 100.0,
                        current_soc * 100.0
                    ),
                );
            }
        }

        let elapsed = self.last_rebuild_at.map(|t| now.duration_since(&t).as_seconds()).unwrap_or(i64::MAX);
        if elapsed >= self.config.planning.periodic_rebuild_interval_seconds {
            return RebuildResult::yes(TriggerReason::Periodic, format!("periodic ({elapsed}s since last rebuild)"));
        }

        if aggregator.is_stale(chrono::Duration::seconds(self.config.resilience.stale_forecast_max_age_seconds)) {
            return RebuildResult::yes(TriggerReason::ForecastDelta, "forecast data is stale");
        }

        RebuildResult::no()
    }

    pub fn mark_rebuilt(&mut self, now: Timestamp) {
        self.last_rebuild_at = Some(now);
    }
}
