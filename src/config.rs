#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::domain::Energy;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    #[validate(nested)]
    pub battery: BatteryConfig,

    #[validate(nested)]
    pub battery_targets: BatteryTargetsConfig,

    #[validate(nested)]
    pub load_profile: LoadProfileConfig,

    #[validate(nested)]
    pub planning: PlanningConfig,

    #[validate(nested)]
    pub arbitrage: ArbitrageConfig,

    #[validate(nested)]
    pub fixed_costs: FixedCostsConfig,

    #[validate(nested)]
    pub accounting: AccountingConfig,

    #[validate(nested)]
    pub anti_oscillation: AntiOscillationConfig,

    #[validate(nested)]
    pub storm: StormConfig,

    #[validate(nested)]
    pub hardware: HardwareConfig,

    #[validate(nested)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    #[validate(nested)]
    pub loads: Vec<LoadConfig>,
}

/// Minimal ambient HTTP surface: `/healthz` and `/status`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse socket address")
    }
}

/// Structured logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub stale_telemetry_max_age_seconds: i64,
}

/// Battery capability and safety envelope.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_battery_config"))]
pub struct BatteryConfig {
    /// Usable capacity.
    pub capacity: Energy,

    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc: f64,

    #[validate(range(min = 1.0))]
    pub max_charge_rate_w: f64,

    #[validate(range(min = 1.0))]
    pub max_discharge_rate_w: f64,

    #[validate(range(min = 0.5, max = 1.0))]
    pub round_trip_efficiency: f64,

    #[serde(default = "default_soc_min_hard")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_min_hard: f64,

    #[serde(default = "default_soc_max_hard")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_max_hard: f64,

    #[serde(default)]
    pub initial_wacb_cents: f64,
}

fn validate_battery_config(config: &BatteryConfig) -> Result<(), validator::ValidationError> {
    if config.capacity.as_watt_hours() <= 0.0 {
        return Err(validator::ValidationError::new("capacity must be positive"));
    }
    if config.soc_min_hard >= config.soc_max_hard {
        return Err(validator::ValidationError::new("soc_min_hard must be less than soc_max_hard"));
    }
    Ok(())
}

/// Soft time-of-day SOC targets used as a solver slack, not a hard limit.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BatteryTargetsConfig {
    #[validate(range(min = 0, max = 23))]
    pub evening_target_hour: u32,

    #[validate(range(min = 0.0, max = 1.0))]
    pub evening_soc_target: f64,

    #[validate(range(min = 0, max = 23))]
    pub morning_minimum_hour: u32,

    #[validate(range(min = 0.0, max = 1.0))]
    pub morning_soc_minimum: f64,
}

/// Household-level context the planner and scheduler need for day/time semantics.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoadProfileConfig {
    /// IANA timezone name; unparseable values fall back to UTC at point of use.
    #[validate(length(min = 1))]
    pub timezone: String,

    #[serde(default = "default_max_grid_import_w")]
    pub max_grid_import_w: f64,
}

/// MILP planner horizon and solve cadence.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PlanningConfig {
    #[validate(range(min = 1, max = 168))]
    pub horizon_hours: u32,

    #[validate(range(min = 5, max = 60))]
    pub slot_duration_minutes: u32,

    #[serde(default = "default_solver_timeout_seconds")]
    #[validate(range(min = 1, max = 120))]
    pub solver_timeout_seconds: u64,

    #[serde(default = "default_soc_deviation_tolerance")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_deviation_tolerance: f64,

    #[serde(default = "default_periodic_rebuild_interval_seconds")]
    pub periodic_rebuild_interval_seconds: i64,

    #[serde(default = "default_evaluation_interval_seconds")]
    pub evaluation_interval_seconds: u64,
}

/// Price-spike and export-gate economics.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ArbitrageConfig {
    #[serde(default = "default_spike_threshold_cents")]
    pub spike_threshold_cents: f64,

    #[serde(default = "default_price_dampen_threshold_cents")]
    pub price_dampen_threshold_cents: f64,

    #[serde(default = "default_price_dampen_factor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub price_dampen_factor: f64,

    #[serde(default = "default_break_even_delta_cents")]
    pub break_even_delta_cents: f64,
}

/// Recurring charges not tied to any single energy flow.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FixedCostsConfig {
    #[serde(default)]
    pub monthly_supply_charge_cents: i64,

    #[serde(default)]
    pub daily_access_fee_cents: i64,

    #[serde(default)]
    pub hedging_per_kwh_cents: f64,
}

/// Billing cycle accounting.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AccountingConfig {
    #[serde(default = "default_billing_cycle_day")]
    #[validate(range(min = 1, max = 31))]
    pub billing_cycle_day: u32,
}

/// Dwell time and rate limiting for command transitions.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AntiOscillationConfig {
    #[serde(default = "default_min_command_duration_seconds")]
    pub min_command_duration_seconds: u64,

    /// Reserved for the hysteresis hook (see `control::anti_oscillation`), which
    /// is currently a documented stub and does not consult this value.
    #[serde(default = "default_hysteresis_band")]
    pub hysteresis_band: f64,

    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,

    #[serde(default = "default_max_commands_per_window")]
    pub max_commands_per_window: u32,
}

/// Severe-weather reserve policy.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StormConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_storm_probability_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability_threshold: f64,

    #[serde(default = "default_storm_reserve_soc_target")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub reserve_soc_target: f64,
}

/// Inverter adapter selection and remote-control watchdog cadence.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HardwareConfig {
    #[serde(default = "default_hardware_mode")]
    pub mode: HardwareMode,

    #[serde(default = "default_remote_refresh_interval_seconds")]
    pub remote_refresh_interval_seconds: u64,

    #[serde(default = "default_watchdog_timeout_seconds")]
    pub watchdog_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareMode {
    Simulated,
    Modbus,
}

/// Health-check cadence and staleness thresholds feeding the resilience manager.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ResilienceConfig {
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_stale_forecast_max_age_seconds")]
    pub stale_forecast_max_age_seconds: i64,

    #[serde(default = "default_stale_telemetry_max_age_seconds")]
    pub stale_telemetry_max_age_seconds: i64,
}

/// Per-provider cache-validity windows. The providers themselves (Amber,
/// Open-Meteo, BOM, Forecast.Solar) are external collaborators outside this
/// crate; this section only carries the staleness policy the aggregator
/// enforces against whatever adapter is wired in at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProvidersConfig {
    #[serde(default = "default_solar_validity_seconds")]
    pub solar_validity_seconds: i64,

    #[serde(default = "default_weather_validity_seconds")]
    pub weather_validity_seconds: i64,

    #[serde(default = "default_storm_validity_seconds")]
    pub storm_validity_seconds: i64,

    #[serde(default = "default_tariff_validity_seconds")]
    pub tariff_validity_seconds: i64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            solar_validity_seconds: default_solar_validity_seconds(),
            weather_validity_seconds: default_weather_validity_seconds(),
            storm_validity_seconds: default_storm_validity_seconds(),
            tariff_validity_seconds: default_tariff_validity_seconds(),
        }
    }
}

/// A single deferrable household load eligible for the second-pass scheduler.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_load_config"))]
pub struct LoadConfig {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(range(min = 1.0))]
    pub power_w: f64,

    #[validate(range(min = 1, max = 5))]
    pub priority_class: u8,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub prefer_solar: bool,

    #[serde(default)]
    pub ideal_runtime_minutes: i64,

    #[serde(default)]
    pub min_runtime_minutes: i64,

    #[serde(default)]
    pub max_runtime_minutes: i64,

    #[validate(length(min = 1))]
    pub timezone: String,

    #[validate(length(min = 1))]
    pub days_of_week: Vec<u8>,

    pub earliest_start_minute: i64,
    pub latest_end_minute: i64,
}

fn validate_load_config(config: &LoadConfig) -> Result<(), validator::ValidationError> {
    if config.days_of_week.iter().any(|&d| d > 6) {
        return Err(validator::ValidationError::new("days_of_week entries must be 0..=6"));
    }
    if !(0..=1440).contains(&config.earliest_start_minute) || !(0..=1440).contains(&config.latest_end_minute) {
        return Err(validator::ValidationError::new("start/end minutes must be within a day"));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_soc_min_hard() -> f64 {
    0.05
}
fn default_soc_max_hard() -> f64 {
    0.95
}
fn default_max_grid_import_w() -> f64 {
    10_000.0
}
fn default_solver_timeout_seconds() -> u64 {
    25
}
fn default_soc_deviation_tolerance() -> f64 {
    0.10
}
fn default_periodic_rebuild_interval_seconds() -> i64 {
    3_600
}
fn default_evaluation_interval_seconds() -> u64 {
    300
}
fn default_spike_threshold_cents() -> f64 {
    100.0
}
fn default_price_dampen_threshold_cents() -> f64 {
    100.0
}
fn default_price_dampen_factor() -> f64 {
    0.5
}
fn default_break_even_delta_cents() -> f64 {
    5.0
}
fn default_billing_cycle_day() -> u32 {
    1
}
fn default_min_command_duration_seconds() -> u64 {
    300
}
fn default_hysteresis_band() -> f64 {
    0.05
}
fn default_rate_limit_window_seconds() -> u64 {
    900
}
fn default_max_commands_per_window() -> u32 {
    3
}
fn default_storm_probability_threshold() -> f64 {
    0.70
}
fn default_storm_reserve_soc_target() -> f64 {
    0.80
}
fn default_hardware_mode() -> HardwareMode {
    HardwareMode::Simulated
}
fn default_remote_refresh_interval_seconds() -> u64 {
    20
}
fn default_watchdog_timeout_seconds() -> u64 {
    3_600
}
fn default_health_check_interval_seconds() -> u64 {
    60
}
fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_stale_forecast_max_age_seconds() -> i64 {
    7_200
}
fn default_stale_telemetry_max_age_seconds() -> i64 {
    120
}
fn default_solar_validity_seconds() -> i64 {
    21_600
}
fn default_weather_validity_seconds() -> i64 {
    3_600
}
fn default_storm_validity_seconds() -> i64 {
    21_600
}
fn default_tariff_validity_seconds() -> i64 {
    300
}

impl AppConfig {
    /// Loads configuration from TOML files and environment variables.
    ///
    /// Order (later overrides earlier):
    /// 1. config/default.toml
    /// 2. config/<environment>.toml, if provided
    /// 3. environment variables prefixed `OEC__`, double-underscore nested
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            figment = figment.merge(Toml::file(format!("config/{env}.toml")));
        } else {
            figment = figment.merge(Toml::file("config/development.toml").nested());
        }

        figment = figment.merge(Env::prefixed("OEC__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }

    /// A fully populated, valid configuration for use in unit tests across
    /// other modules. Not compiled into release builds.
    #[cfg(test)]
    pub fn test_default() -> Self {
        AppConfig {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 8080, request_timeout_secs: 30 },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_json: false,
                stale_telemetry_max_age_seconds: 120,
            },
            battery: BatteryConfig {
                capacity: Energy::kilowatt_hours(13.5),
                initial_soc: 0.5,
                max_charge_rate_w: 5000.0,
                max_discharge_rate_w: 5000.0,
                round_trip_efficiency: 0.9,
                soc_min_hard: default_soc_min_hard(),
                soc_max_hard: default_soc_max_hard(),
                initial_wacb_cents: 20.0,
            },
            battery_targets: BatteryTargetsConfig {
                evening_target_hour: 17,
                evening_soc_target: 0.8,
                morning_minimum_hour: 6,
                morning_soc_minimum: 0.2,
            },
            load_profile: LoadProfileConfig {
                timezone: "Australia/Brisbane".to_string(),
                max_grid_import_w: default_max_grid_import_w(),
            },
            planning: PlanningConfig {
                horizon_hours: 24,
                slot_duration_minutes: 30,
                solver_timeout_seconds: default_solver_timeout_seconds(),
                soc_deviation_tolerance: default_soc_deviation_tolerance(),
                periodic_rebuild_interval_seconds: default_periodic_rebuild_interval_seconds(),
                evaluation_interval_seconds: default_evaluation_interval_seconds(),
            },
            arbitrage: ArbitrageConfig {
                spike_threshold_cents: default_spike_threshold_cents(),
                price_dampen_threshold_cents: default_price_dampen_threshold_cents(),
                price_dampen_factor: default_price_dampen_factor(),
                break_even_delta_cents: default_break_even_delta_cents(),
            },
            fixed_costs: FixedCostsConfig {
                monthly_supply_charge_cents: 0,
                daily_access_fee_cents: 0,
                hedging_per_kwh_cents: 0.0,
            },
            accounting: AccountingConfig { billing_cycle_day: default_billing_cycle_day() },
            anti_oscillation: AntiOscillationConfig {
                min_command_duration_seconds: default_min_command_duration_seconds(),
                hysteresis_band: default_hysteresis_band(),
                rate_limit_window_seconds: default_rate_limit_window_seconds(),
                max_commands_per_window: default_max_commands_per_window(),
            },
            storm: StormConfig {
                enabled: true,
                probability_threshold: default_storm_probability_threshold(),
                reserve_soc_target: default_storm_reserve_soc_target(),
            },
            hardware: HardwareConfig {
                mode: HardwareMode::Simulated,
                remote_refresh_interval_seconds: default_remote_refresh_interval_seconds(),
                watchdog_timeout_seconds: default_watchdog_timeout_seconds(),
            },
            resilience: ResilienceConfig {
                health_check_interval_seconds: default_health_check_interval_seconds(),
                max_consecutive_failures: default_max_consecutive_failures(),
                stale_forecast_max_age_seconds: default_stale_forecast_max_age_seconds(),
                stale_telemetry_max_age_seconds: default_stale_telemetry_max_age_seconds(),
            },
            providers: ProvidersConfig::default(),
            loads: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> BatteryConfig {
        BatteryConfig {
            capacity: Energy::kilowatt_hours(13.5),
            initial_soc: 0.5,
            max_charge_rate_w: 5000.0,
            max_discharge_rate_w: 5000.0,
            round_trip_efficiency: 0.9,
            soc_min_hard: default_soc_min_hard(),
            soc_max_hard: default_soc_max_hard(),
            initial_wacb_cents: 0.0,
        }
    }

    #[test]
    fn battery_config_validates() {
        assert!(battery().validate().is_ok());
    }

    #[test]
    fn battery_config_rejects_inverted_soc_bounds() {
        let mut b = battery();
        b.soc_min_hard = 0.9;
        b.soc_max_hard = 0.1;
        assert!(b.validate().is_err());
    }

    #[test]
    fn server_config_socket_addr() {
        let s = ServerConfig { host: "127.0.0.1".to_string(), port: 8080, request_timeout_secs: 30 };
        assert_eq!(s.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn load_config_rejects_bad_weekday() {
        let load = LoadConfig {
            id: "pool_pump".to_string(),
            name: "Pool pump".to_string(),
            power_w: 1200.0,
            priority_class: 3,
            enabled: true,
            prefer_solar: true,
            ideal_runtime_minutes: 180,
            min_runtime_minutes: 120,
            max_runtime_minutes: 240,
            timezone: "Australia/Brisbane".to_string(),
            days_of_week: vec![0, 1, 7],
            earliest_start_minute: 540,
            latest_end_minute: 1080,
        };
        assert!(load.validate().is_err());
    }
}
