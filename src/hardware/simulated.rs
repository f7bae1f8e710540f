use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{CommandResult, InverterCommand, Mode, Telemetry, Timestamp};

use super::adapter::{AdapterError, InverterAdapter};

/// In-process inverter simulation used by the control loop's own test suite
/// and by `--simulate` deployments without real hardware.
///
/// Implements native self-use: a `SelfUse`/`SelfUseZeroExport` command lets
/// the battery serve local load on its own (positive battery power only up
/// to what the load actually draws), rather than requiring the core to throttle
/// a FORCE_DISCHARGE to load power itself (see the adapter-responsibility
/// decision on discharge-without-export).
pub struct SimulatedInverterAdapter {
    connected: AtomicBool,
    state: RwLock<SimState>,
    capacity_wh: f64,
    max_charge_w: f64,
    max_discharge_w: f64,
}

struct SimState {
    soc: f64,
    battery_power_w: f64,
    solar_power_w: f64,
    load_power_w: f64,
    grid_power_w: f64,
    mode: Mode,
}

impl SimulatedInverterAdapter {
    pub fn new(capacity_wh: f64, max_charge_w: f64, max_discharge_w: f64, initial_soc: f64) -> Self {
        Self {
            connected: AtomicBool::new(false),
            state: RwLock::new(SimState {
                soc: initial_soc,
                battery_power_w: 0.0,
                solar_power_w: 800.0,
                load_power_w: 600.0,
                grid_power_w: 0.0,
                mode: Mode::SelfUse,
            }),
            capacity_wh,
            max_charge_w,
            max_discharge_w,
        }
    }

    /// Advance the simulated environment's solar/load readings; tests drive
    /// this directly instead of waiting on wall-clock time.
    pub fn set_environment(&self, solar_power_w: f64, load_power_w: f64) {
        let mut s = self.state.write();
        s.solar_power_w = solar_power_w;
        s.load_power_w = load_power_w;
    }

    fn step(&self, mode: Mode, power_w: f64) {
        let mut s = self.state.write();
        s.mode = mode;

        s.battery_power_w = match mode {
            Mode::ForceCharge => power_w.min(self.max_charge_w),
            Mode::ForceDischarge => -power_w.min(self.max_discharge_w),
            Mode::ForceChargeZeroImport | Mode::SelfUse | Mode::SelfUseZeroExport => {
                // Native self-use: battery covers the shortfall between load
                // and solar, never drawing more than the load itself needs.
                let net = s.load_power_w - s.solar_power_w;
                net.clamp(-self.max_discharge_w, self.max_charge_w)
            }
        };

        let delivered_to_battery = s.battery_power_w.max(0.0);
        let drawn_from_battery = (-s.battery_power_w).max(0.0);
        s.grid_power_w = s.load_power_w + delivered_to_battery - s.solar_power_w - drawn_from_battery;
        if matches!(mode, Mode::SelfUseZeroExport) {
            s.grid_power_w = s.grid_power_w.max(0.0);
        }

        let energy_wh = s.battery_power_w / 12.0; // 5-minute-equivalent step for simulation purposes
        s.soc = (s.soc + energy_wh / self.capacity_wh).clamp(0.0, 1.0);
    }
}

#[async_trait]
impl InverterAdapter for SimulatedInverterAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_telemetry(&self) -> Result<Telemetry, AdapterError> {
        if !self.is_connected().await {
            return Err(AdapterError::Offline);
        }
        let s = self.state.read();
        Ok(Telemetry {
            soc: s.soc,
            battery_power_w: s.battery_power_w,
            solar_power_w: s.solar_power_w,
            grid_power_w: s.grid_power_w,
            load_power_w: s.load_power_w,
            voltage_v: Some(400.0),
            temperature_c: Some(25.0),
            grid_available: true,
            timestamp: Timestamp::now(),
        })
    }

    async fn send_command(&self, command: InverterCommand) -> Result<CommandResult, AdapterError> {
        if !self.is_connected().await {
            return Err(AdapterError::Offline);
        }
        self.step(command.mode, command.power_w.unsigned_abs() as f64);
        Ok(CommandResult { success: true, latency_ms: 12, message: String::new() })
    }
}
