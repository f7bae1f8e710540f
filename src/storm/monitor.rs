use std::time::Instant;

use crate::config::StormConfig;

use super::reserve::calculate_reserve_soc;

/// Current storm monitoring state.
#[derive(Debug, Clone, Default)]
pub struct StormState {
    pub probability: f64,
    pub is_active: bool,
    pub reserve_soc: f64,
    pub activated_at: Option<Instant>,
    pub deactivated_at: Option<Instant>,
    pub transition_count: u64,
}

/// Tracks storm probability over time and raises/lowers the reserve SOC on
/// threshold crossings, reporting only the edges so callers can log a
/// transition instead of every tick.
pub struct StormMonitor {
    config: StormConfig,
    state: StormState,
}

impl StormMonitor {
    pub fn new(config: StormConfig) -> Self {
        Self { config, state: StormState::default() }
    }

    pub fn state(&self) -> &StormState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn reserve_soc(&self) -> f64 {
        self.state.reserve_soc
    }

    /// Updates storm probability and returns `true` only when the
    /// active/inactive state transitioned this call.
    pub fn update(&mut self, storm_probability: f64) -> bool {
        self.state.probability = storm_probability;
        let reserve = calculate_reserve_soc(storm_probability, &self.config);
        self.state.reserve_soc = reserve;

        let was_active = self.state.is_active;
        let is_now_active = reserve > 0.0;

        if is_now_active && !was_active {
            self.state.is_active = true;
            self.state.activated_at = Some(Instant::now());
            self.state.transition_count += 1;
            tracing::warn!(
                probability_pct = storm_probability * 100.0,
                reserve_pct = reserve * 100.0,
                "storm reserve activated"
            );
            return true;
        }

        if !is_now_active && was_active {
            self.state.is_active = false;
            self.state.deactivated_at = Some(Instant::now());
            self.state.transition_count += 1;
            tracing::info!(probability_pct = storm_probability * 100.0, "storm reserve deactivated");
            return true;
        }

        false
    }

    pub fn reset(&mut self) {
        self.state = StormState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> StormMonitor {
        StormMonitor::new(StormConfig { enabled: true, probability_threshold: 0.70, reserve_soc_target: 0.80 })
    }

    #[test]
    fn activation_reports_transition_once() {
        let mut m = monitor();
        assert!(m.update(0.80));
        assert!(m.is_active());
        assert!(!m.update(0.85));
        assert_eq!(m.state().transition_count, 1);
    }

    #[test]
    fn deactivation_reports_transition() {
        let mut m = monitor();
        m.update(0.80);
        assert!(m.update(0.30));
        assert!(!m.is_active());
        assert_eq!(m.state().transition_count, 2);
    }

    #[test]
    fn reset_clears_state() {
        let mut m = monitor();
        m.update(0.80);
        m.reset();
        assert!(!m.is_active());
        assert_eq!(m.state().transition_count, 0);
    }
}
