use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::types::Timestamp;

/// Operating mode sent to the inverter adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    SelfUse,
    SelfUseZeroExport,
    ForceCharge,
    ForceDischarge,
    /// Safety-oriented mode some inverters support to inhibit discharge
    /// without commanding charge current. Treated identically to `SelfUse`
    /// for planning; only emitted by the resilience/safety layers.
    ForceChargeZeroImport,
}

/// Who produced a command, in descending priority order 1..5 (see `priority()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    Safety,
    Storm,
    Manual,
    Optimiser,
    Fallback,
    Default,
}

impl Source {
    /// Lower number = higher priority, matching the five-level control hierarchy.
    /// `Fallback` has no single priority of its own: the resilience manager picks
    /// one per degraded level (see `resilience::fallback`), so callers needing a
    /// fallback command should use `ControlCommand::with_priority` instead.
    pub fn priority(&self) -> u8 {
        match self {
            Source::Safety => 1,
            Source::Storm => 2,
            Source::Manual => 3,
            Source::Optimiser => 4,
            Source::Fallback => 1,
            Source::Default => 5,
        }
    }
}

/// The single enforceable command produced each tick by the control hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub mode: Mode,
    pub power_w: f64,
    pub source: Source,
    pub priority: u8,
    pub created_at: Timestamp,
}

impl ControlCommand {
    pub fn new(mode: Mode, power_w: f64, source: Source, created_at: Timestamp) -> Self {
        Self {
            mode,
            power_w,
            priority: source.priority(),
            source,
            created_at,
        }
    }

    pub fn default_self_use(now: Timestamp) -> Self {
        Self::new(Mode::SelfUse, 0.0, Source::Default, now)
    }

    /// Construct with an explicit priority, overriding the source's usual default.
    /// Used by the resilience fallback table, where the same `Source::Fallback`
    /// maps to different priorities depending on the degraded level.
    pub fn with_priority(
        mode: Mode,
        power_w: f64,
        source: Source,
        priority: u8,
        created_at: Timestamp,
    ) -> Self {
        Self {
            mode,
            power_w,
            source,
            priority,
            created_at,
        }
    }
}

/// Command sent across the inverter adapter boundary (§6 External interfaces).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverterCommand {
    pub mode: Mode,
    pub power_w: i32,
    pub export_limit_w: Option<i32>,
}

impl From<ControlCommand> for InverterCommand {
    fn from(cmd: ControlCommand) -> Self {
        Self {
            mode: cmd.mode,
            power_w: cmd.power_w.round() as i32,
            export_limit_w: None,
        }
    }
}

/// Result of dispatching a command to the inverter adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub latency_ms: u64,
    pub message: String,
}
