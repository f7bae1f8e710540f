use std::sync::Arc;

use tracing::{error, info};

use crate::domain::Timestamp;

use super::history::{HistoryAverages, HistoryMetric};
use super::spike::SpikeDetector;
use super::types::{
    ForecastSlot, SolarForecast, SolarProvider, StormForecast, StormProvider, TariffSchedule,
    TariffProvider, WeatherForecast, WeatherProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderId {
    Solar,
    Weather,
    Storm,
    Tariff,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Solar => "solar_forecast",
            ProviderId::Weather => "weather_forecast",
            ProviderId::Storm => "storm_forecast",
            ProviderId::Tariff => "tariff",
        }
    }
}

/// Combined forecast state from all providers; last good data survives any
/// individual provider failure.
#[derive(Debug, Clone, Default)]
pub struct AggregatedForecast {
    pub solar: Option<SolarForecast>,
    pub weather: Option<WeatherForecast>,
    pub storm: Option<StormForecast>,
    pub tariff: Option<TariffSchedule>,
    pub last_solar_update: Option<Timestamp>,
    pub last_weather_update: Option<Timestamp>,
    pub last_storm_update: Option<Timestamp>,
    pub last_tariff_update: Option<Timestamp>,
}

impl AggregatedForecast {
    pub fn storm_probability(&self) -> f64 {
        self.storm.as_ref().map(|s| s.max_probability()).unwrap_or(0.0)
    }
}

/// Per-provider validity window, after which cached data is considered stale
/// enough to warrant a refetch even when `respect_validity` is requested.
#[derive(Debug, Clone, Copy)]
pub struct ValidityWindows {
    pub solar_seconds: i64,
    pub weather_seconds: i64,
    pub storm_seconds: i64,
    pub tariff_seconds: i64,
}

impl Default for ValidityWindows {
    fn default() -> Self {
        Self {
            solar_seconds: 21_600,
            weather_seconds: 3_600,
            storm_seconds: 21_600,
            tariff_seconds: 300,
        }
    }
}

impl From<&crate::config::ProvidersConfig> for ValidityWindows {
    fn from(config: &crate::config::ProvidersConfig) -> Self {
        Self {
            solar_seconds: config.solar_validity_seconds,
            weather_seconds: config.weather_validity_seconds,
            storm_seconds: config.storm_validity_seconds,
            tariff_seconds: config.tariff_validity_seconds,
        }
    }
}

/// Outcome of one provider refresh, reported upward so the resilience
/// manager's health checker can record success/failure; the aggregator never
/// raises and never drops previously-good data.
pub struct RefreshOutcome {
    pub provider: ProviderId,
    pub success: bool,
}

pub struct ForecastAggregator {
    solar: Option<Arc<dyn SolarProvider>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    storm: Option<Arc<dyn StormProvider>>,
    tariff: Option<Arc<dyn TariffProvider>>,
    spike: SpikeDetector,
    state: AggregatedForecast,
    validity: ValidityWindows,
}

impl ForecastAggregator {
    pub fn new(spike_threshold_cents: f64, validity: ValidityWindows) -> Self {
        Self {
            solar: None,
            weather: None,
            storm: None,
            tariff: None,
            spike: SpikeDetector::new(spike_threshold_cents),
            state: AggregatedForecast::default(),
            validity,
        }
    }

    pub fn with_providers(
        mut self,
        solar: Option<Arc<dyn SolarProvider>>,
        weather: Option<Arc<dyn WeatherProvider>>,
        storm: Option<Arc<dyn StormProvider>>,
        tariff: Option<Arc<dyn TariffProvider>>,
    ) -> Self {
        self.solar = solar;
        self.weather = weather;
        self.storm = storm;
        self.tariff = tariff;
        self
    }

    pub fn state(&self) -> &AggregatedForecast {
        &self.state
    }

    pub fn spike_detector(&self) -> &SpikeDetector {
        &self.spike
    }

    pub fn spike_detector_mut(&mut self) -> &mut SpikeDetector {
        &mut self.spike
    }

    fn is_fresh(last_update: Option<Timestamp>, validity_s: i64, has_data: bool, now: Timestamp) -> bool {
        match last_update {
            Some(t) if has_data => now.duration_since(&t).as_seconds() < validity_s,
            _ => false,
        }
    }

    async fn update_solar(&mut self) -> bool {
        let Some(provider) = self.solar.clone() else { return true };
        match provider.fetch_forecast().await {
            Ok(forecast) => {
                self.state.solar = Some(forecast);
                self.state.last_solar_update = Some(Timestamp::now());
                true
            }
            Err(e) => {
                error!(error = %e, "solar forecast update failed");
                false
            }
        }
    }

    async fn update_weather(&mut self) -> bool {
        let Some(provider) = self.weather.clone() else { return true };
        match provider.fetch_forecast(48).await {
            Ok(forecast) => {
                self.state.weather = Some(forecast);
                self.state.last_weather_update = Some(Timestamp::now());
                true
            }
            Err(e) => {
                error!(error = %e, "weather forecast update failed");
                false
            }
        }
    }

    async fn update_storm(&mut self) -> bool {
        let Some(provider) = self.storm.clone() else { return true };
        match provider.fetch_alerts().await {
            Ok(forecast) => {
                self.state.storm = Some(forecast);
                self.state.last_storm_update = Some(Timestamp::now());
                true
            }
            Err(e) => {
                error!(error = %e, "storm forecast update failed");
                false
            }
        }
    }

    async fn update_tariff(&mut self) -> bool {
        let Some(provider) = self.tariff.clone() else { return true };
        match provider.fetch_prices().await {
            Ok(schedule) => {
                self.spike.evaluate(&schedule, Timestamp::now());
                self.state.tariff = Some(schedule);
                self.state.last_tariff_update = Some(Timestamp::now());
                true
            }
            Err(e) => {
                error!(error = %e, "tariff update failed");
                false
            }
        }
    }

    /// Attempt to refresh each provider. When `respect_validity` is true,
    /// skips providers whose cached data is still within its validity window.
    /// One provider's failure never blocks the others.
    pub async fn update_all(&mut self, respect_validity: bool) -> Vec<RefreshOutcome> {
        let now = Timestamp::now();
        let mut outcomes = Vec::with_capacity(4);

        if respect_validity
            && Self::is_fresh(self.state.last_solar_update, self.validity.solar_seconds, self.state.solar.is_some(), now)
        {
            info!("solar forecast still fresh, skipping fetch");
        } else {
            outcomes.push(RefreshOutcome { provider: ProviderId::Solar, success: self.update_solar().await });
        }

        if respect_validity
            && Self::is_fresh(self.state.last_weather_update, self.validity.weather_seconds, self.state.weather.is_some(), now)
        {
            info!("weather forecast still fresh, skipping fetch");
        } else {
            outcomes.push(RefreshOutcome { provider: ProviderId::Weather, success: self.update_weather().await });
        }

        if respect_validity
            && Self::is_fresh(self.state.last_storm_update, self.validity.storm_seconds, self.state.storm.is_some(), now)
        {
            info!("storm forecast still fresh, skipping fetch");
        } else {
            outcomes.push(RefreshOutcome { provider: ProviderId::Storm, success: self.update_storm().await });
        }

        if respect_validity
            && Self::is_fresh(self.state.last_tariff_update, self.validity.tariff_seconds, self.state.tariff.is_some(), now)
        {
            info!("tariff data still fresh, skipping fetch");
        } else {
            outcomes.push(RefreshOutcome { provider: ProviderId::Tariff, success: self.update_tariff().await });
        }

        outcomes
    }

    /// True iff any of {tariff, solar} is older than `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        let now = Timestamp::now();
        let too_old = |t: Option<Timestamp>| {
            t.map_or(true, |t| now.duration_since(&t).inner() > max_age)
        };
        // Missing data counts as stale only if it was ever expected; callers
        // that never configured a provider rely on history fallback instead.
        (self.state.tariff.is_some() && too_old(self.state.last_tariff_update))
            || (self.state.solar.is_some() && too_old(self.state.last_solar_update))
    }

    /// Merge per-provider slots into the unified `ForecastSlot` view the
    /// planner consumes, falling back to day-of-week/hour-of-day history
    /// averages for consumption/production where a provider has nothing for
    /// that slot start. `load_w` is the caller-supplied per-slot load
    /// forecast (the core does not itself forecast consumption from a
    /// provider, only via history fallback).
    pub fn build_forecast_slots(&self, starts: &[Timestamp], slot_minutes: i64, history: &HistoryAverages) -> Vec<ForecastSlot> {
        starts
            .iter()
            .map(|&start| {
                let end = start.add(crate::domain::Duration::minutes(slot_minutes));
                let solar = self
                    .state
                    .solar
                    .as_ref()
                    .and_then(|f| f.slots.iter().find(|s| s.start.inner() <= start.inner() && start.inner() < s.end.inner()));
                let weather = self
                    .state
                    .weather
                    .as_ref()
                    .and_then(|f| f.slots.iter().find(|s| s.time.inner() <= start.inner()));
                let tariff = self.state.tariff.as_ref().and_then(|s| s.slot_at(start));

                let (pv_p50_w, pv_p10_w, pv_p90_w) = match solar {
                    Some(s) => (s.pv_p50_w, s.pv_p10_w, s.pv_p90_w),
                    None => {
                        let fallback = history.average_for(HistoryMetric::Production, start).unwrap_or(0.0);
                        (fallback, fallback, fallback)
                    }
                };

                ForecastSlot {
                    start,
                    end,
                    pv_p50_w,
                    pv_p10_w,
                    pv_p90_w,
                    cloud_cover_pct: weather.map(|w| w.cloud_cover_pct).unwrap_or(0.0),
                    temperature_c: weather.map(|w| w.temperature_c).unwrap_or(20.0),
                    storm_probability: self.state.storm_probability(),
                    import_price_cents: tariff.map(|t| t.import_price_cents).unwrap_or(0.0),
                    export_price_cents: tariff.map(|t| t.export_price_cents).unwrap_or(0.0),
                }
            })
            .collect()
    }
}
