use serde::{Deserialize, Serialize};

use super::types::Timestamp;

/// Instantaneous inverter reading. Created each poll; read-only; lifetime is
/// one tick unless buffered for history aggregation.
///
/// Sign conventions: battery power positive = charging; grid power positive
/// = importing. Solar and load power are always >= 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Telemetry {
    /// State of charge, fraction in [0,1].
    pub soc: f64,
    pub battery_power_w: f64,
    pub solar_power_w: f64,
    pub grid_power_w: f64,
    pub load_power_w: f64,
    pub voltage_v: Option<f64>,
    pub temperature_c: Option<f64>,
    pub grid_available: bool,
    pub timestamp: Timestamp,
}

impl Telemetry {
    pub fn is_charging(&self) -> bool {
        self.battery_power_w > 0.0
    }

    pub fn is_discharging(&self) -> bool {
        self.battery_power_w < 0.0
    }

    pub fn is_importing(&self) -> bool {
        self.grid_power_w > 0.0
    }

    pub fn is_exporting(&self) -> bool {
        self.grid_power_w < 0.0
    }

    pub fn age_seconds(&self, now: Timestamp) -> i64 {
        now.duration_since(&self.timestamp).as_seconds()
    }
}
