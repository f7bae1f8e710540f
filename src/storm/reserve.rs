use crate::config::StormConfig;

/// Target reserve SOC for the current storm probability: the configured
/// target once probability crosses the threshold, zero below it. A gradual
/// ramp would smooth the transition but a step function is what the storm
/// feed's confidence level actually supports.
pub fn calculate_reserve_soc(storm_probability: f64, config: &StormConfig) -> f64 {
    if !config.enabled {
        return 0.0;
    }
    if storm_probability >= config.probability_threshold {
        tracing::info!(
            probability = storm_probability,
            threshold = config.probability_threshold,
            target_soc = config.reserve_soc_target,
            "storm reserve active"
        );
        config.reserve_soc_target
    } else {
        0.0
    }
}

/// Hours the battery can sustain `avg_load_w` starting from `current_soc`.
/// Zero when there's no load to sustain or no charge to draw from.
pub fn estimate_hours_at_reserve(current_soc: f64, avg_load_w: f64, capacity_wh: f64) -> f64 {
    if avg_load_w <= 0.0 || current_soc <= 0.0 {
        return 0.0;
    }
    let usable_wh = current_soc * capacity_wh;
    usable_wh / avg_load_w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> StormConfig {
        StormConfig { enabled, probability_threshold: 0.70, reserve_soc_target: 0.80 }
    }

    #[test]
    fn below_threshold_returns_zero() {
        assert_eq!(calculate_reserve_soc(0.5, &config(true)), 0.0);
    }

    #[test]
    fn at_or_above_threshold_returns_target() {
        assert_eq!(calculate_reserve_soc(0.70, &config(true)), 0.80);
        assert_eq!(calculate_reserve_soc(0.95, &config(true)), 0.80);
    }

    #[test]
    fn disabled_always_returns_zero() {
        assert_eq!(calculate_reserve_soc(0.99, &config(false)), 0.0);
    }

    #[test]
    fn hours_at_reserve_zero_without_load() {
        assert_eq!(estimate_hours_at_reserve(0.8, 0.0, 13_500.0), 0.0);
    }

    #[test]
    fn hours_at_reserve_computed_from_usable_energy() {
        let hours = estimate_hours_at_reserve(0.5, 500.0, 13_500.0);
        assert!((hours - 13.5).abs() < 1e-9);
    }
}
