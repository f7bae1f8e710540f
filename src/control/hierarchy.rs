//! 5-level control priority hierarchy. Lower number = higher priority:
//! 1 safety, 2 storm reserve, 3 critical loads (handled by the load manager,
//! not a mode override), 4 cost optimisation (the plan), 5 opportunistic.

use crate::domain::{ControlCommand, Mode, Source, Timestamp};

#[derive(Debug, Clone, Copy)]
pub struct HierarchyResult {
    pub command: ControlCommand,
    pub winning_level: u8,
    pub overridden: bool,
}

pub struct HierarchyInputs {
    pub current_soc: f64,
    pub soc_min_hard: f64,
    pub soc_max_hard: f64,
    pub storm_active: bool,
    pub storm_reserve_soc: f64,
    pub grid_available: bool,
}

pub fn evaluate_hierarchy(plan_command: ControlCommand, inputs: &HierarchyInputs, now: Timestamp) -> HierarchyResult {
    if let Some(safety) = check_safety(&plan_command, inputs, now) {
        return HierarchyResult { command: safety, winning_level: 1, overridden: true };
    }

    if inputs.storm_active {
        if let Some(storm) = check_storm_reserve(&plan_command, inputs, now) {
            return HierarchyResult { command: storm, winning_level: 2, overridden: true };
        }
    }

    // Passed through unmodified: the winning level is whatever priority the
    // candidate already carries (4 for the plan, 3 for manual, 5 for the
    // no-plan default, or a resilience fallback's own assigned priority).
    let winning_level = plan_command.priority;
    HierarchyResult { command: plan_command, winning_level, overridden: false }
}

fn check_safety(command: &ControlCommand, inputs: &HierarchyInputs, now: Timestamp) -> Option<ControlCommand> {
    if inputs.current_soc <= inputs.soc_min_hard
        && matches!(command.mode, Mode::ForceDischarge | Mode::SelfUse)
    {
        let mode = if inputs.grid_available { Mode::ForceCharge } else { Mode::SelfUse };
        tracing::warn!(soc = inputs.current_soc, mode = %mode, "safety: SOC at minimum, overriding");
        let power = if mode == Mode::ForceCharge { command.power_w } else { 0.0 };
        return Some(ControlCommand::new(mode, power, Source::Safety, now));
    }

    if inputs.current_soc >= inputs.soc_max_hard && command.mode == Mode::ForceCharge {
        tracing::warn!(soc = inputs.current_soc, "safety: SOC at maximum, overriding to self-use");
        return Some(ControlCommand::new(Mode::SelfUse, 0.0, Source::Safety, now));
    }

    if !inputs.grid_available && matches!(command.mode, Mode::ForceCharge | Mode::ForceDischarge) {
        tracing::warn!("safety: grid unavailable, overriding to self-use");
        return Some(ControlCommand::new(Mode::SelfUse, 0.0, Source::Safety, now));
    }

    None
}

fn check_storm_reserve(command: &ControlCommand, inputs: &HierarchyInputs, now: Timestamp) -> Option<ControlCommand> {
    if inputs.current_soc <= inputs.storm_reserve_soc && command.mode == Mode::ForceDischarge {
        tracing::info!(
            soc = inputs.current_soc,
            reserve = inputs.storm_reserve_soc,
            "storm reserve: blocking discharge"
        );
        return Some(ControlCommand::new(Mode::SelfUse, 0.0, Source::Storm, now));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> HierarchyInputs {
        HierarchyInputs {
            current_soc: 0.5,
            soc_min_hard: 0.05,
            soc_max_hard: 0.95,
            storm_active: false,
            storm_reserve_soc: 0.0,
            grid_available: true,
        }
    }

    #[test]
    fn safety_overrides_discharge_at_min_soc() {
        let now = Timestamp::now();
        let plan = ControlCommand::new(Mode::ForceDischarge, 1000.0, Source::Optimiser, now);
        let mut inp = inputs();
        inp.current_soc = 0.05;
        let result = evaluate_hierarchy(plan, &inp, now);
        assert_eq!(result.winning_level, 1);
        assert_eq!(result.command.mode, Mode::ForceCharge);
    }

    #[test]
    fn safety_overrides_charge_at_max_soc() {
        let now = Timestamp::now();
        let plan = ControlCommand::new(Mode::ForceCharge, 1000.0, Source::Optimiser, now);
        let mut inp = inputs();
        inp.current_soc = 0.95;
        let result = evaluate_hierarchy(plan, &inp, now);
        assert_eq!(result.command.mode, Mode::SelfUse);
    }

    #[test]
    fn storm_blocks_discharge_below_reserve() {
        let now = Timestamp::now();
        let plan = ControlCommand::new(Mode::ForceDischarge, 1000.0, Source::Optimiser, now);
        let mut inp = inputs();
        inp.storm_active = true;
        inp.storm_reserve_soc = 0.8;
        inp.current_soc = 0.7;
        let result = evaluate_hierarchy(plan, &inp, now);
        assert_eq!(result.winning_level, 2);
        assert_eq!(result.command.mode, Mode::SelfUse);
    }

    #[test]
    fn plan_passes_through_unmodified() {
        let now = Timestamp::now();
        let plan = ControlCommand::new(Mode::ForceCharge, 500.0, Source::Optimiser, now);
        let result = evaluate_hierarchy(plan, &inputs(), now);
        assert!(!result.overridden);
        assert_eq!(result.winning_level, 4);
    }

    #[test]
    fn manual_pass_through_reports_its_own_level() {
        let now = Timestamp::now();
        let manual = ControlCommand::new(Mode::ForceDischarge, 500.0, Source::Manual, now);
        let result = evaluate_hierarchy(manual, &inputs(), now);
        assert!(!result.overridden);
        assert_eq!(result.winning_level, 3);
    }

    #[test]
    fn default_pass_through_reports_its_own_level() {
        let now = Timestamp::now();
        let default = ControlCommand::new(Mode::SelfUse, 0.0, Source::Default, now);
        let result = evaluate_hierarchy(default, &inputs(), now);
        assert!(!result.overridden);
        assert_eq!(result.winning_level, 5);
    }
}
