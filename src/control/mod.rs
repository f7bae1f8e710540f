pub mod anti_oscillation;
pub mod command;
pub mod control_loop;
pub mod hierarchy;
pub mod manual_override;

pub use anti_oscillation::{AntiOscillationGuard, AntiOscillationState};
pub use command::{command_from_slot, dispatch_command};
pub use control_loop::{ControlLoop, LoopStats, TelemetryObserver};
pub use hierarchy::{evaluate_hierarchy, HierarchyInputs, HierarchyResult};
pub use manual_override::ManualOverride;
