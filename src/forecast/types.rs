use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Timestamp;

/// One half-hour slot of tariff data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TariffSlot {
    pub start: Timestamp,
    pub end: Timestamp,
    /// c/kWh, including all fees.
    pub import_price_cents: f64,
    /// c/kWh, feed-in rate, normalised positive.
    pub export_price_cents: f64,
}

impl TariffSlot {
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start.inner() <= t.inner() && t.inner() < self.end.inner()
    }
}

/// Ordered, non-overlapping tariff slots covering the current half-hour to +48h.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TariffSchedule {
    pub slots: Vec<TariffSlot>,
    pub fetched_at: Option<Timestamp>,
    pub provider: String,
}

impl TariffSchedule {
    /// Point lookup by time; `None` if no slot covers `t`.
    pub fn slot_at(&self, t: Timestamp) -> Option<&TariffSlot> {
        self.slots.iter().find(|s| s.contains(t))
    }

    pub fn current_import_price(&self, now: Timestamp) -> Option<f64> {
        self.slot_at(now).map(|s| s.import_price_cents)
    }

    pub fn current_export_price(&self, now: Timestamp) -> Option<f64> {
        self.slot_at(now).map(|s| s.export_price_cents)
    }
}

/// One half-hour slot of solar production forecast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolarForecastSlot {
    pub start: Timestamp,
    pub end: Timestamp,
    pub pv_p50_w: f64,
    pub pv_p10_w: f64,
    pub pv_p90_w: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolarForecast {
    pub slots: Vec<SolarForecastSlot>,
    pub fetched_at: Option<Timestamp>,
    pub provider: String,
}

/// One half-hour slot of weather forecast (cloud cover feeds solar confidence;
/// temperature feeds load forecasting).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherForecastSlot {
    pub time: Timestamp,
    pub temperature_c: f64,
    pub cloud_cover_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub slots: Vec<WeatherForecastSlot>,
    pub fetched_at: Option<Timestamp>,
    pub provider: String,
}

/// A severe-weather alert with an associated probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StormAlert {
    pub probability: f64,
    pub description: String,
    pub valid_from: Timestamp,
    pub valid_to: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StormForecast {
    pub alerts: Vec<StormAlert>,
    pub fetched_at: Option<Timestamp>,
    pub provider: String,
}

impl StormForecast {
    pub fn max_probability(&self) -> f64 {
        self.alerts
            .iter()
            .map(|a| a.probability)
            .fold(0.0, f64::max)
    }
}

/// A merged, solver-ready view of one 30-minute planning slot (§3 Forecast slot).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForecastSlot {
    pub start: Timestamp,
    pub end: Timestamp,
    pub pv_p50_w: f64,
    pub pv_p10_w: f64,
    pub pv_p90_w: f64,
    pub cloud_cover_pct: f64,
    pub temperature_c: f64,
    pub storm_probability: f64,
    pub import_price_cents: f64,
    pub export_price_cents: f64,
}

#[async_trait]
pub trait SolarProvider: Send + Sync {
    async fn fetch_forecast(&self) -> anyhow::Result<SolarForecast>;
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_forecast(&self, hours: u32) -> anyhow::Result<WeatherForecast>;
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
pub trait StormProvider: Send + Sync {
    async fn fetch_alerts(&self) -> anyhow::Result<StormForecast>;
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
pub trait TariffProvider: Send + Sync {
    async fn fetch_prices(&self) -> anyhow::Result<TariffSchedule>;
    async fn is_healthy(&self) -> bool;
}
