use std::collections::HashMap;
use std::time::Instant;

/// Health state of a single external collaborator (inverter, tariff, solar
/// forecast, weather forecast, storm forecast).
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub name: String,
    pub healthy: bool,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_error: String,
}

impl ProviderHealth {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            last_success: Some(Instant::now()),
            last_failure: None,
            consecutive_failures: 0,
            total_failures: 0,
            last_error: String::new(),
        }
    }
}

/// Tracks health of all external providers by consecutive-failure count.
pub struct HealthChecker {
    max_consecutive_failures: u32,
    providers: HashMap<String, ProviderHealth>,
}

impl HealthChecker {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self { max_consecutive_failures, providers: HashMap::new() }
    }

    pub fn register(&mut self, name: &str) {
        self.providers.insert(name.to_string(), ProviderHealth::new(name));
    }

    pub fn record_success(&mut self, name: &str) {
        let p = self.providers.entry(name.to_string()).or_insert_with(|| ProviderHealth::new(name));
        p.healthy = true;
        p.last_success = Some(Instant::now());
        p.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, name: &str, error: impl Into<String>) {
        let max_failures = self.max_consecutive_failures;
        let p = self.providers.entry(name.to_string()).or_insert_with(|| ProviderHealth::new(name));
        p.last_failure = Some(Instant::now());
        p.consecutive_failures += 1;
        p.total_failures += 1;
        p.last_error = error.into();

        if p.consecutive_failures >= max_failures {
            p.healthy = false;
            tracing::warn!(
                provider = %p.name,
                consecutive_failures = p.consecutive_failures,
                error = %p.last_error,
                "provider marked unhealthy"
            );
        }
    }

    /// Unknown providers are assumed healthy.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.providers.get(name).map(|p| p.healthy).unwrap_or(true)
    }

    pub fn get_unhealthy(&self) -> Vec<String> {
        self.providers.values().filter(|p| !p.healthy).map(|p| p.name.clone()).collect()
    }

    pub fn all_healthy(&self) -> bool {
        self.providers.values().all(|p| p.healthy)
    }

    pub fn get_health(&self, name: &str) -> Option<&ProviderHealth> {
        self.providers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_assumed_healthy() {
        let hc = HealthChecker::new(3);
        assert!(hc.is_healthy("inverter"));
    }

    #[test]
    fn marks_unhealthy_after_threshold_failures() {
        let mut hc = HealthChecker::new(3);
        hc.record_failure("tariff", "timeout");
        hc.record_failure("tariff", "timeout");
        assert!(hc.is_healthy("tariff"));
        hc.record_failure("tariff", "timeout");
        assert!(!hc.is_healthy("tariff"));
        assert_eq!(hc.get_unhealthy(), vec!["tariff".to_string()]);
    }

    #[test]
    fn success_resets_consecutive_count() {
        let mut hc = HealthChecker::new(2);
        hc.record_failure("solar_forecast", "");
        hc.record_success("solar_forecast");
        hc.record_failure("solar_forecast", "");
        assert!(hc.is_healthy("solar_forecast"));
    }
}
