use super::health::HealthChecker;
use super::modes::ResilienceLevel;

/// Current resilience state plus bookkeeping for transition logging.
#[derive(Debug, Clone)]
pub struct ResilienceState {
    pub level: ResilienceLevel,
    pub since: std::time::Instant,
}

impl Default for ResilienceState {
    fn default() -> Self {
        Self { level: ResilienceLevel::Normal, since: std::time::Instant::now() }
    }
}

/// Determines the system's operating level from provider health and exposes
/// it to the control loop so a fallback command can be substituted when the
/// optimiser's own inputs can no longer be trusted.
pub struct ResilienceManager {
    state: ResilienceState,
    forecast_providers: Vec<String>,
}

impl ResilienceManager {
    pub fn new(forecast_providers: Vec<String>) -> Self {
        Self { state: ResilienceState::default(), forecast_providers }
    }

    pub fn current_level(&self) -> ResilienceLevel {
        self.state.level
    }

    /// Re-derives the level from current provider health. Returns `true`
    /// when the level changed (the caller should log the transition).
    ///
    /// Priority order, highest first: hardware failure always wins since no
    /// plan can be trusted without telemetry; tariff+forecast together force
    /// safe mode because neither cost nor availability signals are known;
    /// tariff alone or forecast alone degrade independently.
    pub fn evaluate(&mut self, health: &HealthChecker) -> bool {
        let inverter_healthy = health.is_healthy("inverter");
        let tariff_healthy = health.is_healthy("tariff");
        let forecast_healthy = self.forecast_providers.iter().all(|p| health.is_healthy(p));

        let new_level = if !inverter_healthy {
            ResilienceLevel::DegradedHardware
        } else if !tariff_healthy && !forecast_healthy {
            ResilienceLevel::SafeMode
        } else if !tariff_healthy {
            ResilienceLevel::DegradedTariff
        } else if !forecast_healthy {
            ResilienceLevel::DegradedForecast
        } else {
            ResilienceLevel::Normal
        };

        if new_level != self.state.level {
            tracing::warn!(
                from = %self.state.level,
                to = %new_level,
                "resilience level transition"
            );
            self.state = ResilienceState { level: new_level, since: std::time::Instant::now() };
            true
        } else {
            false
        }
    }

    /// Override the level directly, bypassing `evaluate`. Used for an
    /// operator-triggered emergency safe mode.
    pub fn force_level(&mut self, level: ResilienceLevel) {
        self.state = ResilienceState { level, since: std::time::Instant::now() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<String> {
        vec!["solar_forecast".to_string(), "weather_forecast".to_string()]
    }

    #[test]
    fn starts_normal() {
        let mgr = ResilienceManager::new(providers());
        assert_eq!(mgr.current_level(), ResilienceLevel::Normal);
    }

    #[test]
    fn inverter_failure_takes_priority_over_everything() {
        let mut hc = HealthChecker::new(1);
        hc.record_failure("inverter", "timeout");
        hc.record_failure("tariff", "timeout");
        hc.record_failure("solar_forecast", "timeout");
        let mut mgr = ResilienceManager::new(providers());
        assert!(mgr.evaluate(&hc));
        assert_eq!(mgr.current_level(), ResilienceLevel::DegradedHardware);
    }

    #[test]
    fn tariff_and_forecast_down_is_safe_mode() {
        let mut hc = HealthChecker::new(1);
        hc.record_failure("tariff", "timeout");
        hc.record_failure("solar_forecast", "timeout");
        let mut mgr = ResilienceManager::new(providers());
        mgr.evaluate(&hc);
        assert_eq!(mgr.current_level(), ResilienceLevel::SafeMode);
    }

    #[test]
    fn tariff_alone_is_degraded_tariff() {
        let mut hc = HealthChecker::new(1);
        hc.record_failure("tariff", "timeout");
        let mut mgr = ResilienceManager::new(providers());
        mgr.evaluate(&hc);
        assert_eq!(mgr.current_level(), ResilienceLevel::DegradedTariff);
    }

    #[test]
    fn forecast_alone_is_degraded_forecast() {
        let mut hc = HealthChecker::new(1);
        hc.record_failure("weather_forecast", "timeout");
        let mut mgr = ResilienceManager::new(providers());
        mgr.evaluate(&hc);
        assert_eq!(mgr.current_level(), ResilienceLevel::DegradedForecast);
    }

    #[test]
    fn recovery_returns_to_normal_and_reports_transition() {
        let mut hc = HealthChecker::new(1);
        hc.record_failure("tariff", "timeout");
        let mut mgr = ResilienceManager::new(providers());
        assert!(mgr.evaluate(&hc));
        hc.record_success("tariff");
        assert!(mgr.evaluate(&hc));
        assert_eq!(mgr.current_level(), ResilienceLevel::Normal);
    }

    #[test]
    fn unchanged_level_reports_no_transition() {
        let hc = HealthChecker::new(1);
        let mut mgr = ResilienceManager::new(providers());
        assert!(!mgr.evaluate(&hc));
    }
}
